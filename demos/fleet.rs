use std::{thread, time::Duration};

use writer_registry::*;

// A file-writer that publishes a heartbeat per tick and goes silent after `ticks`.
fn simulate_writer(broker: MemoryBroker, topic: String, service_id: &'static str, ticks: u32) {
    thread::spawn(move || {
        let job = format!("{service_id}-job");
        broker.publish(
            &topic,
            format!(
                r#"{{"type":"job_status","job_id":"{job}","service_id":"{service_id}",
                    "state":"writing","file_name":"{job}.nxs"}}"#
            )
            .into_bytes(),
        );
        for _ in 0..ticks {
            broker.publish(
                &topic,
                format!(
                    r#"{{"type":"worker_status","service_id":"{service_id}",
                        "state":"writing","job_id":"{job}"}}"#
                )
                .into_bytes(),
            );
            thread::sleep(Duration::from_millis(200));
        }
    });
}

fn print_fleet(registry: &mut Registry) {
    for worker in registry.list_workers() {
        println!("  worker {:<6} {}", worker.service_id, worker.state);
    }
    for job in registry.list_jobs() {
        println!("  job    {:<10} {}", job.job_id, job.state);
    }
    for command in registry.list_commands() {
        println!("  cmd    {:<10} {}", command.command_id, command.state);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let broker = MemoryBroker::unavailable();
    let url = TopicUrl::parse("memory://localhost:9092/writer_status")?;
    let config = Config::default()
        .with_liveness_timeout(Duration::from_secs(1))
        .with_stale_after(Duration::from_secs(2))
        .with_dead_after(Duration::from_secs(4));

    // The registry may come up before the broker does.
    let mut registry = Registry::connect(broker.source(&url), JsonClassifier, config)?;
    let stale_after = registry.config().stale_after;
    println!("workers silent for more than {stale_after:?} are reported unavailable");
    thread::sleep(Duration::from_millis(300));
    broker.set_available(true);

    simulate_writer(broker.clone(), url.topic().to_string(), "fw-1", 30);
    simulate_writer(broker.clone(), url.topic().to_string(), "fw-2", 5);

    let stop_command = CommandId::generate();
    registry.add_command_id("fw-1-job".into(), stop_command.clone());

    for second in 0..8 {
        thread::sleep(Duration::from_secs(1));
        if second == 3 {
            broker.publish(
                url.topic(),
                format!(
                    r#"{{"type":"command_answer","job_id":"fw-1-job",
                        "command_id":"{stop_command}","outcome":"success"}}"#
                )
                .into_bytes(),
            );
        }
        println!("t={}s", second + 1);
        print_fleet(&mut registry);
    }

    registry.stop_thread();
    Ok(())
}
