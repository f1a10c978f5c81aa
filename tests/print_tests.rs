use pretty_assertions::assert_eq;
use ptouch_driver::mock::{MockHandle, MockTransport, StatusFrame};
use ptouch_driver::raster_command::STATUS_REQUEST;
use ptouch_driver::{Bitmap, ConnectionState, DriverConfig, Error, Printer, UsbId, Unsupported};

const P700: UsbId = UsbId::new(0x04f9, 0x2061);
const D460BT: UsbId = UsbId::new(0x04f9, 0x20e0);
const PT1230PC: UsbId = UsbId::new(0x04f9, 0x202c);

async fn connected(device: UsbId) -> (Printer<MockTransport>, MockHandle) {
    let mock = MockTransport::with_device(device);
    let handle = mock.handle();
    let printer = Printer::new(mock, DriverConfig::default());
    printer.connect().await.unwrap();
    handle.clear_writes();
    (printer, handle)
}

/// Bitmap `width` columns wide and 2 dots tall with the first column filled.
fn test_bitmap(width: usize) -> Bitmap {
    let mut bitmap = Bitmap::new(width, 2);
    bitmap.set(0, 0, true);
    bitmap.set(0, 1, true);
    bitmap
}

/// 16-byte raster data of a 128-dot head; a 2-dot image is centered at dot 63.
fn line(first_column: bool) -> Vec<u8> {
    let mut line = vec![0u8; 16];
    if first_column {
        line[7] = 0x01;
        line[8] = 0x80;
    }
    line
}

fn packbits_line(first_column: bool) -> Vec<u8> {
    [vec![0x47, 0x11, 0x00, 0x0F], line(first_column)].concat()
}

fn plain_line(first_column: bool) -> Vec<u8> {
    [vec![0x47, 0x10, 0x00], line(first_column)].concat()
}

#[tokio::test(start_paused = true)]
async fn test_connect_sends_init_and_status_request() {
    let mock = MockTransport::new();
    let handle = mock.handle();
    let printer = Printer::new(mock, DriverConfig::default());
    printer.connect().await.unwrap();

    let mut init = vec![0u8; 100];
    init.extend_from_slice(&[0x1B, 0x40]);
    assert_eq!(handle.writes(), vec![init, STATUS_REQUEST.to_vec()]);
    assert_eq!(printer.state(), ConnectionState::Idle);

    // already connected
    printer.connect().await.unwrap();
    assert_eq!(handle.writes().len(), 2);
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_without_matching_device() {
    let printer = Printer::new(MockTransport::new(), DriverConfig {
        device: Some(D460BT),
        ..DriverConfig::default()
    });
    assert!(matches!(printer.connect().await, Err(Error::Connection(_))));
    assert_eq!(printer.state(), ConnectionState::Disconnected);
    assert!(!printer.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_times_out_on_silent_device() {
    let mock = MockTransport::new();
    let handle = mock.handle();
    handle.set_silent(true);
    let printer = Printer::new(mock, DriverConfig::default());

    assert!(matches!(
        printer.connect().await,
        Err(Error::Timeout { attempts: 10, .. })
    ));
    assert_eq!(printer.state(), ConnectionState::Disconnected);
    assert!(!handle.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_print_sequence_p700() {
    let (printer, handle) = connected(P700).await;
    printer.print(&test_bitmap(3), false).await.unwrap();

    assert_eq!(
        handle.writes(),
        vec![
            STATUS_REQUEST.to_vec(),
            vec![0x4D, 0x02],
            vec![0x1B, 0x4D, 0x62, 0x00],
            vec![0x1B, 0x69, 0x4D, 0x40],
            packbits_line(true),
            packbits_line(false),
            packbits_line(false),
            vec![0x0C],
        ]
    );
    assert_eq!(printer.state(), ConnectionState::Idle);
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_print_sequence_d460bt_chain() {
    let (printer, handle) = connected(D460BT).await;
    printer.print(&test_bitmap(2), true).await.unwrap();

    assert_eq!(
        handle.writes(),
        vec![
            STATUS_REQUEST.to_vec(),
            vec![0x1B, 0x4D, 0x62, 0x00],
            vec![0x1B, 0x69, 0x7A, 0x00, 0x00, 24, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0x00],
            vec![0x1B, 0x69, 0x4B, 0x00, 0x00],
            vec![0x1B, 0x69, 0x64, 0x0E, 0x00, 0x4D, 0x00],
            vec![0x1B, 0x69, 0x4D, 0x40],
            plain_line(true),
            plain_line(false),
            // chained, but the D460BT family never feeds here
            vec![0x0C],
        ]
    );
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_print_sequence_d460bt_without_chain() {
    let (printer, handle) = connected(D460BT).await;
    printer.print(&test_bitmap(1), false).await.unwrap();

    let writes = handle.writes();
    assert!(!writes.contains(&vec![0x1B, 0x69, 0x4B, 0x00, 0x00]));
    assert_eq!(writes.last().unwrap(), &vec![0x0C]);
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_print_sequence_plain_model_chain_feeds() {
    let (printer, handle) = connected(PT1230PC).await;
    printer.print(&test_bitmap(2), true).await.unwrap();

    assert_eq!(
        handle.writes(),
        vec![
            STATUS_REQUEST.to_vec(),
            vec![0x1B, 0x4D, 0x52, 0x01],
            plain_line(true),
            plain_line(false),
            vec![0x1A],
        ]
    );
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_media_blocks_print() {
    let (printer, handle) = connected(P700).await;
    handle.set_status(StatusFrame::new().errors(0x0001));

    match printer.print(&test_bitmap(4), false).await {
        Err(Error::FatalPrinter {
            device,
            word,
            errors,
        }) => {
            assert_eq!(device, "PT-P700");
            assert_eq!(word, 0x0001);
            assert_eq!(errors, vec!["No media"]);
        }
        other => panic!("expected FatalPrinter, got {:?}", other),
    }
    assert_eq!(handle.writes(), vec![STATUS_REQUEST.to_vec()]);
    assert_eq!(handle.raster_lines(), 0);
    assert!(printer.is_connected());
    assert_eq!(printer.state(), ConnectionState::Idle);
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_weak_battery_still_prints() {
    let (printer, handle) = connected(P700).await;
    handle.set_status(StatusFrame::new().errors(0x0008));

    printer.print(&test_bitmap(4), false).await.unwrap();
    assert_eq!(handle.raster_lines(), 4);
    assert_eq!(printer.status().unwrap().errors[0].description, "Weak batteries");
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_error_pushed_mid_job_aborts() {
    let (printer, handle) = connected(P700).await;
    handle.push_status_after_raster_lines(3, StatusFrame::new().errors(0x1000));

    let result = printer.print(&test_bitmap(10), false).await;
    assert!(matches!(result, Err(Error::FatalPrinter { word: 0x1000, .. })));
    assert_eq!(handle.raster_lines(), 3);
    assert_ne!(handle.writes().last().unwrap(), &vec![0x0C]);
    assert_eq!(printer.status().unwrap().error_word, 0x1000);
    assert!(printer.is_connected());
    assert_eq!(printer.state(), ConnectionState::Idle);
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_short_frame_pushed_mid_job_is_drained() {
    let (printer, handle) = connected(P700).await;
    handle.push_frames_after_raster_lines(
        3,
        [vec![0u8; 16], StatusFrame::new().errors(0x1000).to_vec()],
    );

    let result = printer.print(&test_bitmap(10), false).await;
    assert!(matches!(result, Err(Error::FatalPrinter { word: 0x1000, .. })));
    assert_eq!(handle.raster_lines(), 3);
    assert!(printer.is_connected());
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_lone_short_frame_mid_job_does_not_stop_print() {
    let (printer, handle) = connected(P700).await;
    handle.push_frames_after_raster_lines(2, [vec![0u8; 16]]);

    printer.print(&test_bitmap(4), false).await.unwrap();
    assert_eq!(handle.raster_lines(), 4);
    assert_eq!(handle.writes().last().unwrap(), &vec![0x0C]);
    assert_eq!(printer.state(), ConnectionState::Idle);
    printer.disconnect().await;
}

#[tokio::test]
async fn test_print_requires_connection() {
    let printer = Printer::new(MockTransport::new(), DriverConfig::default());
    assert!(matches!(
        printer.print(&test_bitmap(1), false).await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_bitmap_taller_than_head_is_rejected() {
    let (printer, handle) = connected(P700).await;
    let bitmap = Bitmap::new(4, 129);
    assert!(matches!(
        printer.print(&bitmap, false).await,
        Err(Error::InvalidBitmap(_))
    ));
    assert!(handle.writes().is_empty());
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_transfer_failure_disconnects() {
    let (printer, handle) = connected(P700).await;
    handle.set_fail_transfers(true);

    assert!(matches!(
        printer.print(&test_bitmap(2), false).await,
        Err(Error::Transfer { .. })
    ));
    assert_eq!(printer.state(), ConnectionState::Disconnected);
    assert!(!printer.is_connected());
    assert!(!handle.is_open());
    assert_eq!(printer.device_name(), "?");
}

#[tokio::test(start_paused = true)]
async fn test_status_timeout_disconnects() {
    let (printer, handle) = connected(P700).await;
    handle.set_silent(true);

    assert!(matches!(
        printer.print(&test_bitmap(2), false).await,
        Err(Error::Timeout { .. })
    ));
    assert_eq!(printer.state(), ConnectionState::Disconnected);
    assert_eq!(handle.raster_lines(), 0);
}

// Real time: the job and this test both have to make progress
#[tokio::test]
async fn test_disconnect_during_print_stops_promptly() {
    let (printer, handle) = connected(P700).await;
    let job = {
        let printer = printer.clone();
        tokio::spawn(async move { printer.print(&test_bitmap(1000), false).await })
    };

    while handle.raster_lines() < 5 {
        tokio::task::yield_now().await;
    }
    printer.disconnect().await;

    let result = job.await.unwrap();
    assert!(matches!(result, Err(Error::NotConnected)));
    assert!(handle.raster_lines() < 1000);
    assert!(!handle.writes().contains(&vec![0x0C]));
    assert_eq!(printer.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let (printer, handle) = connected(P700).await;
    printer.disconnect().await;
    printer.disconnect().await;

    assert_eq!(printer.state(), ConnectionState::Disconnected);
    assert!(!handle.is_open());
    assert!(printer.device_type().is_none());
    assert_eq!(printer.device_name(), "?");
    // the last status stays readable
    assert_eq!(printer.status().unwrap().media_width_mm, 24);

    // and the printer can connect again
    printer.connect().await.unwrap();
    assert_eq!(printer.device_name(), "PT-P700");
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_capability_check() {
    let (printer, _) = connected(UsbId::new(0x04f9, 0x2064)).await;
    assert_eq!(printer.capability_check(), Some(Unsupported::PliteMode));
    printer.disconnect().await;

    let (printer, _) = connected(UsbId::new(0x04f9, 0x2060)).await;
    assert_eq!(printer.capability_check(), Some(Unsupported::UnsupportedRaster));
    printer.disconnect().await;

    let (printer, _) = connected(P700).await;
    assert_eq!(printer.capability_check(), None);
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_short_frame_resynchronizes() {
    let (printer, handle) = connected(P700).await;
    handle.script_reply([vec![0u8; 16], StatusFrame::new().tape_color(0x06).to_vec()]);

    let status = printer.refresh_status().await.unwrap();
    assert_eq!(status.tape_color_code, 0x06);
    assert!(printer.is_connected());
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_lone_short_frame_keeps_connection() {
    let (printer, handle) = connected(P700).await;
    handle.script_reply([vec![0u8; 16]]);

    assert!(matches!(
        printer.refresh_status().await,
        Err(Error::ProtocolFormat(ptouch_driver::FrameError::ShortFrame))
    ));
    assert!(printer.is_connected());
    assert_eq!(printer.state(), ConnectionState::Idle);

    // the next request gets a normal answer
    let status = printer.refresh_status().await.unwrap();
    assert_eq!(status.raw_data(), &StatusFrame::new().bytes());
    printer.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_bad_header_flushes_one_frame() {
    let (printer, handle) = connected(P700).await;
    let mut bad = StatusFrame::new().to_vec();
    bad[0] = 0x81;
    handle.script_reply([bad, vec![0xFF; 32]]);

    assert!(matches!(
        printer.refresh_status().await,
        Err(Error::ProtocolFormat(ptouch_driver::FrameError::Header {
            mark: 0x81,
            size: 0x20
        }))
    ));
    // a protocol error keeps the connection, and the junk frame is gone
    assert!(printer.is_connected());
    let status = printer.refresh_status().await.unwrap();
    assert_eq!(status.raw_data(), &StatusFrame::new().bytes());
    printer.disconnect().await;
}
