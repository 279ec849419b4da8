//! End-to-end timelines: injectors driven with a recording runner and an
//! in-memory fault log, on a paused clock.

use async_trait::async_trait;
use fault_core::{
    CancellationToken, CommandRunner, FaultPattern, FaultType, LinkInjector, MemoryFaultLog,
    MultiInjector, NodeInjector, Protocol, Timing, TrafficFilter,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingRunner {
    commands: Mutex<Vec<String>>,
    return_code: i32,
}

impl RecordingRunner {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &str) -> i32 {
        self.commands.lock().unwrap().push(command.to_string());
        self.return_code
    }
}

fn fixture() -> (Arc<RecordingRunner>, Arc<MemoryFaultLog>) {
    (
        Arc::new(RecordingRunner::default()),
        Arc::new(MemoryFaultLog::new()),
    )
}

#[tokio::test(start_paused = true)]
async fn persistent_loss_on_interface() {
    let (runner, log) = fixture();
    let injector = LinkInjector::builder()
        .tag("loss-1")
        .device("eth0")
        .ns_pid(100)
        .fault(FaultType::Loss)
        .pattern(FaultPattern::Persistent)
        .timing(Timing::active(Duration::from_secs(2)))
        .logger(log.clone())
        .runner(runner.clone())
        .build()
        .unwrap();

    let started = tokio::time::Instant::now();
    injector.go().await.unwrap();
    assert_eq!(started.elapsed(), Duration::from_secs(2));

    assert_eq!(
        runner.commands(),
        vec![
            "nsenter --target 100 --net --pid tc qdisc add dev eth0 root netem loss 100%",
            "nsenter --target 100 --net --pid tc qdisc del dev eth0 root netem loss 100%",
        ]
    );

    let events = log.events_for("loss-1");
    assert_eq!(events.len(), 2);
    assert!(events[0].is_active());
    assert!(!events[1].is_active());
}

#[tokio::test(start_paused = true)]
async fn burst_delay_cycles() {
    let (runner, log) = fixture();
    let injector = LinkInjector::builder()
        .tag("burst-1")
        .device("eth0")
        .fault(FaultType::Delay {
            latency: "100ms".into(),
        })
        .pattern(FaultPattern::Burst {
            duration: Duration::from_millis(500),
            period: Duration::from_millis(2000),
        })
        .timing(Timing::active(Duration::from_secs(5)))
        .logger(log.clone())
        .runner(runner.clone())
        .build()
        .unwrap();

    let started = tokio::time::Instant::now();
    injector.go().await.unwrap();
    // ⌊5 / 2⌋ = 2 cycles, 0.5 s on and 1.5 s off each
    assert_eq!(started.elapsed(), Duration::from_secs(4));

    let commands = runner.commands();
    assert_eq!(commands.len(), 4);
    for add in [&commands[0], &commands[2]] {
        assert_eq!(add.as_str(), "tc qdisc add dev eth0 root netem delay 100ms");
    }
    for del in [&commands[1], &commands[3]] {
        assert_eq!(del.as_str(), "tc qdisc del dev eth0 root netem delay 100ms");
    }

    let events = log.events_for("burst-1");
    assert_eq!(events.len(), 4);
    assert!(events.iter().step_by(2).all(|e| e.is_active()));
    assert!(events.iter().skip(1).step_by(2).all(|e| !e.is_active()));
}

#[tokio::test(start_paused = true)]
async fn filtered_random_loss_activates_classifier_tree() {
    let (runner, log) = fixture();
    let injector = LinkInjector::builder()
        .tag("tcp-loss")
        .device("eth2")
        .ns_pid(7)
        .fault(FaultType::Loss)
        .pattern(FaultPattern::Random { percent: 10.0 })
        .filter(TrafficFilter {
            protocol: fault_core::ProtocolTarget::Proto(Protocol::Tcp),
            dst_ports: vec![80],
            src_ports: vec![],
        })
        .timing(Timing::active(Duration::from_secs(1)))
        .logger(log.clone())
        .runner(runner.clone())
        .build()
        .unwrap();

    injector.go().await.unwrap();

    let commands = runner.commands();
    assert_eq!(commands.len(), 4);
    assert_eq!(
        commands[0],
        "nsenter --target 7 --net --pid tc qdisc add dev eth2 root handle 1: prio"
    );
    assert_eq!(
        commands[1],
        "nsenter --target 7 --net --pid tc filter add dev eth2 parent 1:0 protocol ip \
         prio 1 u32 match ip protocol 6 0xff match ip dport 80 0xffff flowid 1:1"
    );
    assert_eq!(
        commands[2],
        "nsenter --target 7 --net --pid tc qdisc add dev eth2 parent 1:1 handle 2: netem loss 10%"
    );
    assert_eq!(
        commands[3],
        "nsenter --target 7 --net --pid tc qdisc del dev eth2 root handle 1: prio"
    );

    // one active record per add command, then the teardown marker
    let events = log.events_for("tcp-loss");
    assert_eq!(events.len(), 4);
    assert!(events[..3].iter().all(|e| e.is_active()));
    assert!(!events[3].is_active());
}

#[tokio::test(start_paused = true)]
async fn custom_degradation_fills_intensity() {
    let (runner, log) = fixture();
    let injector = NodeInjector::builder()
        .tag("deg-1")
        .ns_pid(55)
        .fault(FaultType::Custom {
            start: Some("set_rate {} &".into()),
            stop: Some("clear_rate".into()),
        })
        .pattern(FaultPattern::Degradation {
            step: 10.0,
            step_length: Duration::from_secs(1),
            start: 0.0,
            end: 50.0,
        })
        .timing(Timing::active(Duration::from_secs(5)))
        .logger(log.clone())
        .runner(runner.clone())
        .build()
        .unwrap();

    injector.go().await.unwrap();

    let commands = runner.commands();
    assert_eq!(commands.len(), 10);
    let prefix = "nsenter --target 55 --net --pid --cgroup";
    for (step, intensity) in [0, 10, 20, 30, 40].into_iter().enumerate() {
        assert_eq!(
            commands[step * 2],
            format!("{prefix} set_rate {intensity} &")
        );
        assert_eq!(commands[step * 2 + 1], format!("{prefix} clear_rate"));
    }

    let events = log.events_for("deg-1");
    assert_eq!(events.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn multi_injector_reenters_namespace_per_pipeline_stage() {
    let (runner, log) = fixture();
    let config = r#"{"eth0": {"outgoing": {"delay": "10ms"}}}"#;
    let injector = MultiInjector::builder()
        .tag("multi-1")
        .ns_pid(31)
        .config(config)
        .pattern(FaultPattern::Persistent)
        .timing(Timing::active(Duration::from_secs(3)))
        .logger(log.clone())
        .runner(runner.clone())
        .build()
        .unwrap();

    injector.go().await.unwrap();

    let commands = runner.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[0].starts_with(&format!(
        "nsenter --target 31 --net --pid echo '{config}'"
    )));
    // every pipeline stage runs inside the namespace
    for command in &commands {
        assert_eq!(command.matches("nsenter --target 31 --net --pid").count(), 2);
        assert!(command.ends_with("| nsenter --target 31 --net --pid tcset /dev/stdin --import-setting"));
    }
    assert!(commands[1].contains(r#""outgoing":{}"#));
}

#[tokio::test(start_paused = true)]
async fn cancellation_tears_down_and_pairs_log_events() {
    let (runner, log) = fixture();
    let injector = LinkInjector::builder()
        .tag("cancel-1")
        .device("eth0")
        .ns_pid(100)
        .fault(FaultType::Corrupt)
        .pattern(FaultPattern::Persistent)
        .timing(Timing::active(Duration::from_secs(60)))
        .logger(log.clone())
        .runner(runner.clone())
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let task = {
        let cancel = cancel.clone();
        let injector = Arc::new(injector);
        let injector_task = injector.clone();
        tokio::spawn(async move { injector_task.run(cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();
    task.await.unwrap().unwrap();

    let commands = runner.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[0].contains("tc qdisc add dev eth0 root netem corrupt 100%"));
    assert!(commands[1].contains("tc qdisc del dev eth0 root netem corrupt 100%"));

    let events = log.events_for("cancel-1");
    assert_eq!(events.len(), 2);
    assert!(events[0].is_active());
    assert!(!events[1].is_active());
}

#[tokio::test(start_paused = true)]
async fn pre_and_post_waits_bracket_the_active_phase() {
    let (runner, log) = fixture();
    let injector = LinkInjector::builder()
        .tag("waits-1")
        .device("eth0")
        .fault(FaultType::Duplicate)
        .pattern(FaultPattern::Persistent)
        .timing(Timing::from_secs_f64(1.5, 2.0, 0.5))
        .logger(log.clone())
        .runner(runner.clone())
        .build()
        .unwrap();

    let started = tokio::time::Instant::now();
    injector.go().await.unwrap();
    assert_eq!(started.elapsed(), Duration::from_secs(4));
    assert_eq!(runner.commands().len(), 2);
}
