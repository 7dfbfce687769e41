use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use thumbgen_core::task::Toast;
use thumbgen_media::capture::{CaptureOptions, FrameCapturer};
use thumbgen_media::decoder::FfmpegDecoder;
use thumbgen_media::surface::Stage;
use thumbgen_runtime::handler::Notifier;
use thumbgen_runtime::lifecycle::ThumbnailGenerator;
use thumbgen_runtime::registry::WorkerRegistry;
use thumbgen_runtime::worker::{DirectoryScan, DirectorySink, StaticPending, thumbnail_worker};
use thumbgen_test_harness::{assertions, fixtures};

struct ChannelNotifier(mpsc::UnboundedSender<Toast>);

impl Notifier for ChannelNotifier {
    fn notify(&self, toast: &Toast) {
        let _ = self.0.send(toast.clone());
    }
}

#[tokio::test]
async fn test_directory_run_writes_red_thumbnail() {
    let videos = fixtures::fixture_dir();
    let thumbnails = fixtures::fixture_dir();
    fixtures::generate_solid_color_video(videos.path(), "abc123", "red", 2.0);

    let registry = Arc::new(WorkerRegistry::new(thumbnail_worker(
        Arc::new(DirectoryScan::new(videos.path(), thumbnails.path())),
        Arc::new(DirectorySink::new(thumbnails.path())),
    )));
    let stage = Stage::new();
    let capturer =
        FrameCapturer::<FfmpegDecoder>::new(fixtures::origin_for(videos.path()), stage.clone());
    let (toast_tx, mut toasts) = mpsc::unbounded_channel();
    let generator = ThumbnailGenerator::new(registry, Arc::new(capturer))
        .with_notifier(Arc::new(ChannelNotifier(toast_tx)));

    let mount = generator.mount();
    let mut status = mount.worker().unwrap().status();
    let done = tokio::time::timeout(
        Duration::from_secs(30),
        status.wait_for(|s| s.uploaded == 1 && s.is_drained()),
    )
    .await
    .expect("thumbnail was not generated in time")
    .map(|s| *s)
    .unwrap();
    assert_eq!(done.failed, 0);

    let toast = tokio::time::timeout(Duration::from_secs(5), toasts.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(toast.category, "success");

    let bytes = std::fs::read(thumbnails.path().join("abc123.jpg")).unwrap();
    let image = assertions::assert_decodable_jpeg(&bytes);
    assert_eq!(image.dimensions(), (320, 240));
    assertions::assert_pixel_approx(&image, 160, 120, [255, 0, 0], 40);

    mount.unmount();
    assert_eq!(stage.live_count(), 0);
}

#[tokio::test]
async fn test_missing_video_does_not_block_others() {
    let videos = fixtures::fixture_dir();
    let thumbnails = fixtures::fixture_dir();
    fixtures::generate_test_video(videos.path(), "present", 1.0);

    let registry = Arc::new(WorkerRegistry::new(thumbnail_worker(
        Arc::new(StaticPending::new(["absent", "present"])),
        Arc::new(DirectorySink::new(thumbnails.path())),
    )));
    let stage = Stage::new();
    let capturer =
        FrameCapturer::<FfmpegDecoder>::new(fixtures::origin_for(videos.path()), stage.clone());
    let generator = ThumbnailGenerator::new(registry, Arc::new(capturer));

    let mount = generator.mount();
    let worker = mount.worker().unwrap().clone();
    let mut status = worker.status();
    let snapshot = tokio::time::timeout(Duration::from_secs(30), status.wait_for(|s| s.uploaded == 1))
        .await
        .expect("present video was not captured")
        .map(|s| *s)
        .unwrap();

    assert_eq!(snapshot.outstanding, 1, "the absent video stays outstanding");
    assert!(thumbnails.path().join("present.jpg").exists());
    assert!(!worker.is_terminated());
    assert_eq!(mount.captures_in_flight(), 1);

    mount.unmount();
    tokio::time::timeout(Duration::from_secs(5), async {
        while stage.live_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("surfaces of the abandoned capture were not released");
}

#[tokio::test]
async fn test_timeout_abandons_corrupt_video() {
    let videos = fixtures::fixture_dir();
    let thumbnails = fixtures::fixture_dir();
    fixtures::write_corrupt_video(videos.path(), "broken");

    let registry = Arc::new(WorkerRegistry::new(thumbnail_worker(
        Arc::new(StaticPending::new(["broken"])),
        Arc::new(DirectorySink::new(thumbnails.path())),
    )));
    let capturer = FrameCapturer::<FfmpegDecoder>::new(fixtures::origin_for(videos.path()), Stage::new())
        .with_options(CaptureOptions {
            signal_timeout: Some(Duration::from_millis(200)),
            ..CaptureOptions::default()
        });
    let generator = ThumbnailGenerator::new(registry, Arc::new(capturer));

    let mount = generator.mount();
    let worker = mount.worker().unwrap().clone();
    let mut status = worker.status();
    let done = tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.failed == 1))
        .await
        .expect("worker never heard the capture was abandoned")
        .map(|s| *s)
        .unwrap();

    assert!(done.is_drained(), "{done:?}");
    assert_eq!(done.uploaded, 0);
    assert_eq!(mount.captures_in_flight(), 0, "capture was not abandoned");
    assert!(!worker.is_terminated(), "a timeout is not fatal");
    assert!(!thumbnails.path().join("broken.jpg").exists());
}
