//! End-to-end scenarios over a loopback TCP fixture emulating a Davis
//! console: wake handshake, one ACKed `LOOP` request, then packet bytes.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use weather_davis::{crc16_ccitt, DavisIngester};
use weather_types::{Device, Ingester, Transport};

fn build_packet(fill: impl FnOnce(&mut [u8; 99])) -> [u8; 99] {
    let mut buf = [0u8; 99];
    buf[0..3].copy_from_slice(b"LOO");
    fill(&mut buf);
    let crc = crc16_ccitt(&buf[0..97]);
    buf[97..99].copy_from_slice(&crc.to_be_bytes());
    buf
}

fn happy_packet() -> [u8; 99] {
    build_packet(|b| {
        b[12..14].copy_from_slice(&725i16.to_le_bytes()); // outTemp 72.5F
        b[33] = 45; // outHumidity
        b[7..9].copy_from_slice(&30150u16.to_le_bytes()); // barometer
        b[16..18].copy_from_slice(&180u16.to_le_bytes()); // windDir
        b[14] = 8; // windSpeed
    })
}

/// Serve one wake handshake and one ACKed LOOP request, then write `packets`
/// back to back before going silent.
async fn serve_one_cycle(listener: TcpListener, packets: Vec<[u8; 99]>) {
    let (mut stream, _) = listener.accept().await.unwrap();

    let mut wake_byte = [0u8; 1];
    stream.read_exact(&mut wake_byte).await.unwrap();
    stream.write_all(b"\n\r").await.unwrap();

    let mut cmd = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await.unwrap();
        cmd.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
    }
    stream.write_all(&[0x06]).await.unwrap();

    for packet in packets {
        stream.write_all(&packet).await.unwrap();
    }

    // Go quiet: further reads from the ingester (its next LOOP request cycle)
    // simply never get a response; the test cancels shutdown before that
    // matters.
    let mut sink = [0u8; 1];
    let _ = stream.read_exact(&mut sink).await;
}

fn device(port: u16, loop_count: u32) -> Device {
    let mut options = std::collections::HashMap::new();
    options.insert("loop_count".to_string(), loop_count.to_string());
    Device {
        name: "k1".into(),
        device_type: "davis".into(),
        transport: Transport::Tcp { hostname: "127.0.0.1".into(), port },
        wind_dir_correction: 0,
        base_snow_distance: None,
        location: None,
        snow_enabled: false,
        uploads: Default::default(),
        options,
    }
}

#[tokio::test]
async fn davis_happy_path_emits_one_reading() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(serve_one_cycle(listener, vec![happy_packet()]));

    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(10);
    let shutdown = CancellationToken::new();
    let ingester = DavisIngester::new(device(port, 1)).unwrap();
    ingester.start(shutdown.clone(), out_tx).await.unwrap();

    let reading = tokio::time::timeout(Duration::from_secs(5), out_rx.recv())
        .await
        .expect("reading should arrive")
        .expect("channel should not close");

    assert!((reading.outside_temperature - 72.5).abs() < 1e-9);
    assert!((reading.outside_humidity - 45.0).abs() < 1e-9);
    assert!((reading.barometer - 30.150).abs() < 1e-9);
    assert_eq!(reading.wind_dir, 180.0);
    assert_eq!(reading.wind_speed, 8.0);

    shutdown.cancel();
    ingester.stop().await;
}

#[tokio::test]
async fn davis_crc_corruption_drops_only_the_bad_packet() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut corrupted = happy_packet();
    corrupted[20] ^= 0x01; // flip a data byte, leave the CRC as-is

    tokio::spawn(serve_one_cycle(listener, vec![corrupted, happy_packet()]));

    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(10);
    let shutdown = CancellationToken::new();
    let ingester = DavisIngester::new(device(port, 2)).unwrap();
    ingester.start(shutdown.clone(), out_tx).await.unwrap();

    let reading = tokio::time::timeout(Duration::from_secs(5), out_rx.recv())
        .await
        .expect("the valid packet should still produce a reading")
        .expect("channel should not close");
    assert!((reading.outside_temperature - 72.5).abs() < 1e-9);

    // No second reading shows up for the corrupted packet.
    let second = tokio::time::timeout(Duration::from_millis(200), out_rx.recv()).await;
    assert!(second.is_err(), "corrupted packet must not produce a reading");

    shutdown.cancel();
    ingester.stop().await;
}
