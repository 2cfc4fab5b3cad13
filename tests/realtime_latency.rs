// Integration test: Real-time budget
//
// process_block must finish well inside one block period. Timings are
// generous so the test also holds in unoptimized builds.

use daw_transport::sequencer::TempoEvent;
use daw_transport::{
    create_transport, Command, EngineConfig, GrooveSettings, MetronomePlugin, TempoMap, Transport,
};
use std::time::Instant;

const SAMPLE_RATE: f64 = 48000.0;
const BUFFER_SIZE: usize = 512;

fn dense_map(events: u64) -> TempoMap {
    let mut map = TempoMap::new(SAMPLE_RATE).unwrap();
    for i in 1..events {
        let bpm = 80.0 + (i % 60) as f64;
        map.insert_tempo(TempoEvent::new(i * 4800, bpm).unwrap());
    }
    map
}

#[test]
fn test_process_block_within_budget() {
    let (mut controller, mut engine) = create_transport(
        &EngineConfig::default(),
        dense_map(1000),
        GrooveSettings::straight(),
    );
    engine.add_plugin(Box::new(MetronomePlugin::new(SAMPLE_RATE as f32)));
    controller
        .submit(Command::SetLoopRegion {
            start: 0,
            end: 2_400_000,
        })
        .unwrap();
    controller.submit(Command::LoopToggle).unwrap();
    controller.submit(Command::Play).unwrap();

    let mut output = vec![0.0f32; BUFFER_SIZE * 2];
    let blocks = 2000;
    let start = Instant::now();
    for _ in 0..blocks {
        engine.process_block(&mut output, 2);
    }
    let average = start.elapsed() / blocks;

    // 512 frames at 48 kHz = 10.67 ms
    let budget = engine.deadline_monitor().budget_ns(BUFFER_SIZE);
    println!("Average process_block: {:?} (budget {} ns)", average, budget);
    assert!(
        (average.as_nanos() as u64) < budget / 4,
        "process_block took too long: {:?}",
        average
    );
    assert_eq!(engine.deadline_monitor().blocks(), blocks as u64);
}

#[test]
fn test_advance_cost_independent_of_position() {
    let mut transport = Transport::new(Box::new(dense_map(5000)));
    transport.play();

    let early_start = Instant::now();
    for _ in 0..5000 {
        transport.advance(BUFFER_SIZE);
    }
    let early = early_start.elapsed();

    transport.seek(20_000_000);
    transport.play();
    let late_start = Instant::now();
    for _ in 0..5000 {
        transport.advance(BUFFER_SIZE);
    }
    let late = late_start.elapsed();

    println!("advance early: {:?}, late: {:?}", early, late);
    // Lookups are logarithmic; allow plenty of noise
    assert!(late < early * 20 + std::time::Duration::from_millis(50));
}
