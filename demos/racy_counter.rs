//! Several incrementers read a shared counter, yield, then write back the value they read plus
//! one. Interleaving two reads before a write loses an update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use turnstile::*;

fn racy_counter(rt: Runtime, incrementer_count: u64) -> ActorResult {
    let counter = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicU64::new(0));
    for _ in 0..incrementer_count {
        let (counter, finished) = (Arc::clone(&counter), Arc::clone(&finished));
        rt.spawn("Incrementer", move |rt| {
            let read = counter.load(Ordering::SeqCst);
            rt.schedule()?;
            counter.store(read + 1, Ordering::SeqCst);
            if finished.fetch_add(1, Ordering::SeqCst) + 1 == incrementer_count {
                let total = counter.load(Ordering::SeqCst);
                rt.assert(
                    total == incrementer_count,
                    format!("lost update: counter={}, expected={}", total, incrementer_count),
                )?;
            }
            Ok(())
        })?;
    }
    Ok(())
}

fn check(
    config: Configuration,
    incrementer_count: u64,
    trace_path: Option<String>,
) -> Result<(), EngineError> {
    let mut engine = TestingEngine::new(config)?;
    let report = engine.run_and_report(
        move |rt| racy_counter(rt, incrementer_count),
        &mut WriteReporter::new(&mut std::io::stdout()),
    )?;
    println!(
        "Explored {} iterations with {} (fully explored: {}).",
        report.iterations, report.strategy, report.fully_explored
    );
    if let (Some(bug), Some(path)) = (report.bugs.first(), trace_path) {
        bug.trace.save(&path)?;
        println!("Saved the trace of the first bug to {}.", path);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // `RUST_LOG=${LEVEL}` env variable to override
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let mut args = pico_args::Arguments::from_env();
    let incrementer_count: u64 = args.opt_value_from_str("--incrementers")?.unwrap_or(2);
    let seed: u64 = args.opt_value_from_str("--seed")?.unwrap_or(0);
    let trace_path: Option<String> = args.opt_value_from_str("--save")?;
    match args.subcommand()?.as_deref() {
        Some("check-random") => {
            let iterations = args.opt_free_from_str()?.unwrap_or(100);
            println!(
                "Randomly testing {} incrementers for {} iterations.",
                incrementer_count, iterations
            );
            let config = Configuration::default()
                .strategy(StrategyKind::Random)
                .iterations(Some(iterations))
                .seed(seed);
            check(config, incrementer_count, trace_path)?;
        }
        Some("check-dfs") => {
            println!("Exhaustively testing {} incrementers.", incrementer_count);
            let config = Configuration::default()
                .strategy(StrategyKind::Dfs)
                .iterations(None)
                .stop_when(StopCondition::Never);
            check(config, incrementer_count, trace_path)?;
        }
        Some("check-hybrid") => {
            let iterations = args.opt_free_from_str()?.unwrap_or(100);
            println!(
                "Testing {} incrementers with bounded DFS then random walks.",
                incrementer_count
            );
            let config = Configuration::default()
                .strategy(StrategyKind::Hybrid)
                .iterations(Some(iterations))
                .safety_prefix_bound(2)
                .seed(seed);
            check(config, incrementer_count, trace_path)?;
        }
        Some("interactive") => {
            println!("Choose every schedule of {} incrementers.", incrementer_count);
            let config = Configuration::default()
                .strategy(StrategyKind::Interactive)
                .iterations(None);
            check(config, incrementer_count, None)?;
        }
        Some("replay") => {
            let path: String = args.free_from_str()?;
            let trace = ScheduleTrace::load(&path)?;
            println!("Replaying {} ({} steps).", path, trace.len());
            let report = TestingEngine::replaying(Configuration::default(), trace).run_and_report(
                move |rt| racy_counter(rt, incrementer_count),
                &mut WriteReporter::new(&mut std::io::stdout()),
            )?;
            println!("Reproduced {} bug(s).", report.bugs.len());
        }
        _ => {
            println!("USAGE:");
            println!(
                "  ./racy_counter [--incrementers N] [--seed S] [--save PATH] \
                 check-random [ITERATIONS]"
            );
            println!("  ./racy_counter [--incrementers N] [--save PATH] check-dfs");
            println!(
                "  ./racy_counter [--incrementers N] [--seed S] [--save PATH] \
                 check-hybrid [ITERATIONS]"
            );
            println!("  ./racy_counter [--incrementers N] interactive");
            println!("  ./racy_counter [--incrementers N] replay PATH");
        }
    }

    Ok(())
}
