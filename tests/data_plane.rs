//! End-to-end tests from signal to typed reader
//!
//! Covers descriptor propagation, domain signals, reader replacement and
//! packet-ready notification across the public API.

use anyhow::{Result, ensure};
use daqflow::{
    Connection, DataDescriptor, DataPacket, DataRule, DescriptorUpdate, InputPort, MainLoopScheduler,
    NotificationMode, Packet, PacketReader, ReadStatus, Reader, ReaderState, SampleType, Signal,
    StreamReader,
};
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn descriptor(name: &str, sample_type: SampleType) -> DataDescriptor {
    DataDescriptor::builder().name(name).sample_type(sample_type).build().expect("descriptor")
}

fn time_descriptor() -> DataDescriptor {
    DataDescriptor::builder()
        .name("time")
        .sample_type(SampleType::Int64)
        .rule(DataRule::linear(10, 0))
        .origin("2024-01-01T00:00:00Z")
        .build()
        .expect("time descriptor")
}

fn data(signal: &Signal, samples: &[i32]) -> Packet {
    let descriptor = signal.descriptor().expect("described signal");
    Packet::from(DataPacket::from_samples(descriptor, samples).expect("samples"))
}

fn data_with_time(signal: &Signal, time: &Signal, samples: &[i32], offset: i64) -> Packet {
    let domain = DataPacket::implicit(time.descriptor().expect("time descriptor"), samples.len(), offset)
        .expect("domain packet");
    let descriptor = signal.descriptor().expect("described signal");
    let packet = DataPacket::from_samples(descriptor, samples).expect("samples");
    Packet::from(packet.with_domain(domain).expect("domain length"))
}

#[test]
fn samples_flow_from_signal_to_reader() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let time = Signal::with_descriptor("time", time_descriptor());
    let signal = Signal::with_descriptor("ai0", descriptor("ai0", SampleType::Int32));
    signal.set_domain_signal(Some(&time));

    let port = InputPort::builder("in").build();
    let mut reader = StreamReader::builder(port.connect(&signal)?).build::<f64, i64>()?;
    ensure!(reader.domain_descriptor().is_some_and(|d| d.name() == "time"));

    signal.send_packet_and_steal_ref(data_with_time(&signal, &time, &[1, 2, 3], 1000));
    signal.send_packet_and_steal_ref(data_with_time(&signal, &time, &[4, 5], 1030));

    let mut values = [0.0; 5];
    let mut ticks = [0i64; 5];
    let outcome = reader.read_with_domain(&mut values, &mut ticks, 5, Duration::from_millis(100))?;
    ensure!(outcome.status == ReadStatus::Ok && outcome.count == 5);
    ensure!(values == [1.0, 2.0, 3.0, 4.0, 5.0]);
    ensure!(ticks == [1000, 1010, 1020, 1030, 1040]);
    Ok(())
}

#[test]
fn domain_packets_must_cover_every_sample() -> Result<()> {
    let time = Signal::with_descriptor("time", time_descriptor());
    let signal = Signal::with_descriptor("ai0", descriptor("ai0", SampleType::Int32));
    let short = DataPacket::implicit(time.descriptor().expect("time descriptor"), 1, 0)?;
    let samples = DataPacket::from_samples(signal.descriptor().expect("described signal"), &[3, 4])?;
    ensure!(samples.with_domain(short).is_err());
    Ok(())
}

#[test]
fn standalone_connection_reads_packets_queued_after_reader() -> Result<()> {
    let connection = Connection::new("in");
    let mut reader = StreamReader::builder(connection.clone()).build::<f64, i64>()?;

    let ai0 = Arc::new(descriptor("ai0", SampleType::Float64));
    connection.enqueue_and_steal_ref(Packet::from(DataPacket::from_samples(ai0, &[1.0f64, 2.0])?));

    let mut values = [0.0; 2];
    let outcome = reader.read(&mut values, 2, Duration::from_millis(50))?;
    ensure!(outcome.count == 2 && values == [1.0, 2.0]);
    ensure!(connection.packet_count() == 0);
    Ok(())
}

#[test]
fn invalid_descriptor_yaml_is_rejected() -> Result<()> {
    let yaml = serde_yaml_ng::to_string(&time_descriptor())?;
    ensure!(serde_yaml_ng::from_str::<DataDescriptor>(&yaml).is_ok());
    let broken = yaml.replace("2024-01-01T00:00:00Z", "yesterday");
    ensure!(broken != yaml);
    ensure!(serde_yaml_ng::from_str::<DataDescriptor>(&broken).is_err());
    Ok(())
}

#[test]
fn descriptor_changes_reach_connected_readers() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let signal = Signal::with_descriptor("ai0", descriptor("ai0", SampleType::Int32));
    let port = InputPort::builder("in").build();
    let mut reader = StreamReader::builder(port.connect(&signal)?).build::<f64, i64>()?;

    signal.send_packet_and_steal_ref(data(&signal, &[1, 2]));
    signal.set_descriptor(Some(descriptor("ai0", SampleType::Int16)));
    let int16 = signal.descriptor().expect("new descriptor");
    signal.send_packet_and_steal_ref(Packet::from(DataPacket::from_samples(int16, &[7i16, 8])?));

    let mut values = [0.0; 4];
    let outcome = reader.read(&mut values, 4, Duration::ZERO)?;
    ensure!(outcome.status == ReadStatus::Event && outcome.count == 2);
    ensure!(reader.value_descriptor().is_some_and(|d| d.sample_type() == SampleType::Int16));

    let outcome = reader.read(&mut values, 4, Duration::ZERO)?;
    ensure!(outcome.count == 2 && values[..2] == [7.0, 8.0]);
    Ok(())
}

#[test]
fn domain_signal_changes_announce_domain_descriptor() -> Result<()> {
    let time = Signal::with_descriptor("time", time_descriptor());
    let signal = Signal::with_descriptor("ai0", descriptor("ai0", SampleType::Int32));
    signal.set_domain_signal(Some(&time));

    let port = InputPort::builder("in").build();
    let mut reader = StreamReader::builder(port.connect(&signal)?).build::<f64, i64>()?;

    let slower = time_descriptor().to_builder().rule(DataRule::linear(20, 0)).build()?;
    time.set_descriptor(Some(slower));

    let mut values = [0.0; 1];
    let outcome = reader.read(&mut values, 1, Duration::ZERO)?;
    ensure!(outcome.is_event());
    let change = outcome.change.expect("descriptor change");
    ensure!(change.value.is_unchanged());
    ensure!(matches!(change.domain, DescriptorUpdate::Changed(_)));
    ensure!(reader.domain_descriptor().is_some_and(|d| d.rule() == &DataRule::linear(20, 0)));
    Ok(())
}

#[test]
fn incompatible_change_is_recovered_with_replacement_reader() -> Result<()> {
    let signal = Signal::with_descriptor("ai0", descriptor("ai0", SampleType::Int32));
    let port = InputPort::builder("in").build();
    let mut reader = StreamReader::builder(port.connect(&signal)?).build::<f64, i64>()?;

    signal.send_packet_and_steal_ref(data(&signal, &[1]));
    signal.set_descriptor(Some(descriptor("blob", SampleType::Binary)));
    signal.send_packet_and_steal_ref(Packet::from(DataPacket::explicit(
        signal.descriptor().expect("binary descriptor"),
        1,
        vec![0xAB],
    )?));

    let mut values = [0.0; 4];
    let outcome = reader.read(&mut values, 4, Duration::ZERO)?;
    ensure!(outcome.status == ReadStatus::Invalid && outcome.count == 1);
    ensure!(reader.state() == ReaderState::Invalid);

    let mut packets = PacketReader::from_existing(reader);
    ensure!(packets.value_descriptor().is_some_and(|d| d.sample_type() == SampleType::Binary));
    let packet = packets.read().expect("binary packet");
    ensure!(packet.as_data().is_some_and(|d| d.data() == Some(&[0xAB][..])));
    Ok(())
}

#[test]
fn disconnect_closes_connection_and_invalidates_reader() -> Result<()> {
    let signal = Signal::with_descriptor("ai0", descriptor("ai0", SampleType::Int32));
    let port = InputPort::builder("in").build();
    let connection = port.connect(&signal)?;
    let mut reader = StreamReader::builder(connection.clone()).build::<f64, i64>()?;

    ensure!(port.connect(&signal).is_err());
    port.disconnect()?;
    ensure!(connection.is_closed());
    ensure!(signal.connections().is_empty());
    ensure!(port.disconnect().is_err());

    let mut values = [0.0; 1];
    ensure!(reader.read(&mut values, 1, Duration::from_secs(1))?.status == ReadStatus::Invalid);
    Ok(())
}

#[test]
fn scheduler_notification_runs_on_main_loop() -> Result<()> {
    let scheduler = Arc::new(MainLoopScheduler::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);

    let port = InputPort::builder("in")
        .notification_mode(NotificationMode::SchedulerQueueWasEmpty)
        .scheduler(scheduler.clone())
        .listener(Arc::new(move |connection: &daqflow::Connection| {
            seen.fetch_add(1, Ordering::SeqCst);
            connection.dequeue_all();
        }))
        .build();

    let signal = Signal::with_descriptor("ai0", descriptor("ai0", SampleType::Int32));
    port.connect(&signal)?;
    signal.send_packet_and_steal_ref(data(&signal, &[1]));
    signal.send_packet_and_steal_ref(data(&signal, &[2]));

    // Only the descriptor event found the queue empty
    ensure!(calls.load(Ordering::SeqCst) == 0);
    ensure!(scheduler.run_pending() == 1);
    ensure!(calls.load(Ordering::SeqCst) == 1);

    signal.send_packet_and_steal_ref(data(&signal, &[3]));
    ensure!(scheduler.run_pending() == 1);
    ensure!(calls.load(Ordering::SeqCst) == 2);
    Ok(())
}

#[tokio::test]
async fn connection_streams_packets_until_closed() -> Result<()> {
    let signal = Signal::with_descriptor("ai0", descriptor("ai0", SampleType::Int32));
    let port = InputPort::builder("in").build();
    let connection = port.connect(&signal)?;
    let mut packets = Box::pin(connection.packet_stream());

    let producer = signal.clone();
    let sender = tokio::spawn(async move {
        for i in 0..3 {
            producer.send_packet_and_steal_ref(data(&producer, &[i]));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let first = packets.next().await.expect("descriptor event");
    ensure!(first.is_descriptor_changed());
    let mut samples = 0;
    while samples < 3 {
        let packet = packets.next().await.expect("data packet");
        samples += packet.sample_count();
    }
    sender.await?;

    port.disconnect()?;
    ensure!(packets.next().await.is_none());
    Ok(())
}
