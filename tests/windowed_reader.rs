//! Block and tail readers driven through signals and input ports

use anyhow::{Result, ensure};
use daqflow::{
    BlockReader, DataDescriptor, DataPacket, InputPort, Packet, ReadStatus, ReadTimeoutType,
    Reader, ReaderConfig, SampleType, Signal, StreamReader, TailReader,
};
use std::thread;
use std::time::Duration;

fn float_signal() -> Signal {
    let descriptor = DataDescriptor::builder()
        .name("ai0")
        .sample_type(SampleType::Float32)
        .build()
        .expect("descriptor");
    Signal::with_descriptor("ai0", descriptor)
}

fn send(signal: &Signal, samples: &[f32]) {
    let descriptor = signal.descriptor().expect("described signal");
    let packet = DataPacket::from_samples(descriptor, samples).expect("samples");
    signal.send_packet_and_steal_ref(Packet::from(packet));
}

fn ramp(start: f32, len: usize) -> Vec<f32> {
    (0..len).map(|i| start + i as f32).collect()
}

#[test]
fn block_reader_counts_whole_blocks() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let signal = float_signal();
    let any_port = InputPort::builder("any").build();
    let all_port = InputPort::builder("all").build();
    let mut any = BlockReader::builder(any_port.connect(&signal)?)
        .block_size(4)
        .timeout_type(ReadTimeoutType::Any)
        .build::<f32, i64>()?;
    let mut all = BlockReader::builder(all_port.connect(&signal)?).block_size(4).build::<f32, i64>()?;

    send(&signal, &ramp(0.0, 4));
    send(&signal, &ramp(4.0, 3));
    send(&signal, &ramp(7.0, 1));

    let mut values = [0.0f32; 8];
    ensure!(any.read(&mut values, 2, Duration::from_millis(50))?.count == 1);
    ensure!(all.read(&mut values, 2, Duration::from_millis(50))?.count == 2);
    ensure!(values == [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    Ok(())
}

#[test]
fn block_reader_waits_for_producer() -> Result<()> {
    let signal = float_signal();
    let port = InputPort::builder("in").build();
    let mut reader = BlockReader::builder(port.connect(&signal)?).block_size(8).build::<f64, i64>()?;

    let producer = signal.clone();
    let handle = thread::spawn(move || {
        for chunk in 0..6 {
            thread::sleep(Duration::from_millis(3));
            send(&producer, &ramp(chunk as f32 * 3.0, 3));
        }
    });

    let mut values = [0.0; 16];
    let outcome = reader.read(&mut values, 2, Duration::from_secs(10))?;
    handle.join().expect("producer thread");
    ensure!(outcome.status == ReadStatus::Ok && outcome.count == 2);
    ensure!(values.iter().enumerate().all(|(i, v)| *v == i as f64));
    ensure!(reader.available_count() == 0);
    Ok(())
}

#[test]
fn block_reader_from_yaml_config() -> Result<()> {
    let config = ReaderConfig::from_yaml("block_size: 4\noverlap: 75\n")?;
    let signal = float_signal();
    let port = InputPort::builder("in").build();
    let mut reader =
        BlockReader::builder(port.connect(&signal)?).config(config).build::<f64, i64>()?;
    ensure!(reader.overlap_samples() == 3);

    send(&signal, &ramp(0.0, 6));
    ensure!(reader.available_count() == 3);
    let mut values = [0.0; 12];
    ensure!(reader.read(&mut values, 3, Duration::ZERO)?.count == 3);
    ensure!(values[8..] == [2.0, 3.0, 4.0, 5.0]);
    Ok(())
}

#[test]
fn tail_reader_keeps_recent_history() -> Result<()> {
    let signal = float_signal();
    let port = InputPort::builder("in").build();
    let mut reader =
        TailReader::builder(port.connect(&signal)?).history_size(5).build::<f64, i64>()?;

    let mut values = [0.0; 5];
    ensure!(reader.read(&mut values, 3)?.count == 0);
    ensure!(reader.read(&mut [0.0; 6], 6).is_err());

    send(&signal, &[1.0, 2.0, 3.0]);
    ensure!(reader.read(&mut values, 5)?.count == 3);
    ensure!(values == [1.0, 2.0, 3.0, 0.0, 0.0]);

    send(&signal, &[4.0, 5.0, 6.0]);
    ensure!(reader.read(&mut values, 5)?.count == 5);
    ensure!(values == [2.0, 3.0, 4.0, 5.0, 6.0]);
    Ok(())
}

#[test]
fn tail_reader_hands_queue_to_stream_reader() -> Result<()> {
    let signal = float_signal();
    let port = InputPort::builder("in").build();
    let mut tail = TailReader::builder(port.connect(&signal)?).history_size(4).build::<f64, i64>()?;

    send(&signal, &[1.0, 2.0]);
    let mut values = [0.0; 2];
    tail.read(&mut values, 2)?;
    send(&signal, &[3.0]);

    let mut stream = StreamReader::<f64>::from_existing(tail)?;
    let outcome = stream.read(&mut values, 2, Duration::ZERO)?;
    ensure!(outcome.count == 1 && values[0] == 3.0);
    Ok(())
}
