use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hsmstage::{
    ActorSpec, LogWriter, MachineSpec, Outcome, Payload, Stage, StageConfig, StateSpec,
    StateTracker, TimerSpec,
};
use tracing_subscriber::EnvFilter;

const LINES: u64 = 5;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = StageConfig {
        grace: Duration::from_secs(2),
        ..StageConfig::default()
    };

    let sent = Arc::new(AtomicU64::new(0));
    let source = {
        let sent = sent.clone();
        MachineSpec::new("Main")
            .state(
                StateSpec::new("Emitting")
                    .timer(TimerSpec::new("Tick").every(Duration::from_millis(200)).autostart())
                    .on("Tick", move |ctx| {
                        let n = sent.fetch_add(1, Ordering::Relaxed) + 1;
                        let line = Payload::new().with("line", format!("line #{n}"));
                        ctx.signal("Relay.Main.Line", line)?;
                        if n == LINES {
                            ctx.goto("Quiet");
                        }
                        Ok(Outcome::Handled)
                    }),
            )
            .state(StateSpec::new("Quiet"))
    };

    let relay = MachineSpec::new("Main").state(StateSpec::new("Init").on_when(
        "Line",
        |g| Ok(!g.field_str("line")?.is_empty()),
        |ctx| {
            let line = ctx.field_str("line")?.to_uppercase();
            ctx.signal("Sink.Main.Line", Payload::new().with("line", line))?;
            Ok(Outcome::Handled)
        },
    ));

    let received = Arc::new(AtomicU64::new(0));
    let sink = {
        let received = received.clone();
        MachineSpec::new("Main").state(StateSpec::new("Init").on("Line", move |ctx| {
            let n = received.fetch_add(1, Ordering::Relaxed) + 1;
            println!("sink got {:?}", ctx.field_str("line")?);
            if n == LINES {
                ctx.signal("Sink.Main.Done", Payload::new())?;
            }
            Ok(Outcome::Handled)
        }))
    };

    let tracker = Arc::new(StateTracker::new());
    let stage = Stage::builder("Demo", cfg)
        .observer(Arc::new(LogWriter::new()))
        .observer(tracker.clone())
        .actor(ActorSpec::new("Source").machine(source))
        .actor(ActorSpec::new("Relay").machine(relay))
        .actor(ActorSpec::new("Sink").machine(sink))
        .build()?;

    let handle = stage.handle();
    let closer = handle.clone();
    handle.mount(ActorSpec::new("Closer").machine(MachineSpec::new("Main").state(
        StateSpec::new("Init").on("Sink.Main.Done", move |_| {
            closer.shutdown();
            Ok(Outcome::Handled)
        }),
    )))?;

    match stage.run().await {
        Ok(()) => println!("stage stopped gracefully"),
        Err(e) => println!("stage stopped with error: {e}"),
    }
    for (machine, state) in tracker.snapshot() {
        println!("{machine} ended in {state}");
    }
    Ok(())
}
