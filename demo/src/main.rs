//! Exercises `oop_scheduler`'s out-of-order processor against a toy model.
//!
//! Schedules a small write/read/read scenario (one task sets a counter in
//! `DataGraph`, two more read it) some number of times, optionally printing
//! the pending DAG before each batch runs.

use clap::Parser;
use oop_scheduler::{ComponentId, ModelData, Processor, Task, Value};

/// Drives the out-of-order processor through a toy scheduling scenario.
#[derive(Parser)]
#[command(name = "scheduler-demo")]
#[command(about = "Exercises the out-of-order processor against a toy model")]
struct Cli {
    /// Priority of the scenario's writer task; its two readers are
    /// scheduled one and two priority levels above it.
    #[arg(short, long, default_value_t = 0)]
    priority: i32,

    /// Number of times to schedule the scenario before draining the queue.
    #[arg(short, long, default_value_t = 1)]
    replay: u32,

    /// Print the pending DAG before executing each batch.
    #[arg(long)]
    explain: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut processor = Processor::new(ModelData::new());

    for replay in 0..cli.replay {
        schedule_scenario(&mut processor, cli.priority, replay);
    }

    if cli.explain {
        println!("pending instructions before execution:");
        for pending in processor.pending() {
            println!(
                "  {:?} priority={} waiting_on={:?}",
                pending.id, pending.priority, pending.waiting_on
            );
        }
    }

    if let Err(err) = processor.process_all_tasks() {
        eprintln!("scheduler error: {err}");
        std::process::exit(1);
    }

    let count = processor
        .model()
        .get(ComponentId::DataGraph)
        .and_then(Value::downcast_ref::<i32>)
        .copied()
        .unwrap_or(0);
    println!("DataGraph = {count}");
}

fn schedule_scenario(processor: &mut Processor, base_priority: i32, replay: u32) {
    let writer = Task::new(
        move |ctx| {
            let current = ctx
                .get(ComponentId::DataGraph)
                .and_then(Value::downcast_ref::<i32>)
                .copied()
                .unwrap_or(0);
            tracing::info!(replay, current, "writer running");
            ctx.set(ComponentId::DataGraph, Value::new(current + 1));
            Ok(())
        },
        [],
        [ComponentId::DataGraph],
        base_priority,
    );

    let reader = |label: &'static str, priority: i32| {
        Task::new(
            move |ctx| {
                let value = ctx
                    .get(ComponentId::DataGraph)
                    .and_then(Value::downcast_ref::<i32>)
                    .copied();
                tracing::info!(replay, label, value, "reader running");
                Ok(())
            },
            [ComponentId::DataGraph],
            [],
            priority,
        )
    };

    processor.schedule(writer);
    processor.schedule(reader("first", base_priority + 1));
    processor.schedule(reader("second", base_priority + 2));
}
