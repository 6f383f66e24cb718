//! Timed screenshot loop.

use anyhow::{Context, Result, anyhow};
use futures_util::FutureExt;
use image::{ImageFormat, RgbaImage};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Anything that can produce the current screen contents.
pub trait ScreenSource {
    fn grab(&mut self) -> Result<RgbaImage>;
}

/// The display the OS marks as primary.
///
/// `xcap` lists monitors in platform order (XRandR order on X11), so the
/// primary flag decides; the first listed monitor is only a fallback for
/// platforms that report no primary at all.
pub struct PrimaryMonitor;

impl ScreenSource for PrimaryMonitor {
    fn grab(&mut self) -> Result<RgbaImage> {
        let monitors =
            xcap::Monitor::all().map_err(|error| anyhow!("Failed to list monitors: {error}"))?;
        let monitor = primary_of(&monitors, |monitor| monitor.is_primary().unwrap_or(false))
            .context("No monitors found")?;
        monitor
            .capture_image()
            .map_err(|error| anyhow!("Failed to capture screen: {error}"))
    }
}

fn primary_of<T>(monitors: &[T], is_primary: impl Fn(&T) -> bool) -> Option<&T> {
    monitors
        .iter()
        .find(|monitor| is_primary(monitor))
        .or_else(|| monitors.first())
}

pub fn parse_interval(value: &str) -> Result<Duration, String> {
    match value.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
        _ => Err("Interval must be a positive integer.".to_owned()),
    }
}

fn screenshot_path(output_dir: &Path) -> Result<PathBuf> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the Unix epoch")?
        .as_secs();
    Ok(output_dir.join(format!("screenshot_{timestamp}.png")))
}

/// Saves a screenshot every `interval` until `stop` resolves.
///
/// Shots taken within the same second overwrite each other.
pub async fn run(
    source: &mut impl ScreenSource,
    interval: Duration,
    output_dir: &Path,
    stop: impl Future,
) -> Result<()> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    println!(
        "Starting screenshot capture every {} seconds. Screenshots will be saved to '{}'. Press Ctrl+C to stop.",
        interval.as_secs(),
        output_dir.display()
    );

    tokio::pin!(stop);
    // Signal futures install their handler on first poll.
    if (&mut stop).now_or_never().is_some() {
        println!("\nScreenshot capture stopped.");
        return Ok(());
    }

    loop {
        let frame = source.grab()?;
        let path = screenshot_path(output_dir)?;
        frame
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Screenshot saved: {}", path.display());

        tokio::select! {
            _ = &mut stop => {
                println!("\nScreenshot capture stopped.");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::Poll;

    struct Blank {
        grabs: usize,
    }

    impl ScreenSource for Blank {
        fn grab(&mut self) -> Result<RgbaImage> {
            self.grabs += 1;
            Ok(RgbaImage::new(4, 3))
        }
    }

    struct Broken;

    impl ScreenSource for Broken {
        fn grab(&mut self) -> Result<RgbaImage> {
            bail!("display went away")
        }
    }

    fn screenshots(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn is_screenshot_name(name: &str) -> bool {
        name.strip_prefix("screenshot_")
            .and_then(|rest| rest.strip_suffix(".png"))
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    }

    #[test]
    fn interval_must_be_a_positive_integer() {
        assert_eq!(parse_interval("3"), Ok(Duration::from_secs(3)));
        for bad in ["0", "-1", "1.5", "soon", ""] {
            assert!(parse_interval(bad).is_err(), "{bad:?} was accepted");
        }
    }

    #[tokio::test]
    async fn writes_timestamped_pngs_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = Blank { grabs: 0 };

        run(
            &mut source,
            Duration::from_secs(1),
            dir.path(),
            tokio::time::sleep(Duration::from_millis(1500)),
        )
        .await
        .unwrap();

        let names = screenshots(dir.path());
        assert_eq!(source.grabs, 2);
        assert_eq!(names.len(), 2, "{names:?}");
        for name in &names {
            assert!(is_screenshot_name(name), "{name}");
            let decoded = image::open(dir.path().join(name)).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (4, 3));
        }
    }

    #[test]
    fn prefers_the_monitor_marked_primary() {
        let monitors = [("left", false), ("centre", true), ("right", false)];
        let primary = primary_of(&monitors, |monitor| monitor.1).unwrap();
        assert_eq!(primary.0, "centre");

        let unmarked = [("left", false), ("right", false)];
        assert_eq!(primary_of(&unmarked, |monitor| monitor.1).unwrap().0, "left");

        let none: [(&str, bool); 0] = [];
        assert!(primary_of(&none, |monitor| monitor.1).is_none());
    }

    #[tokio::test]
    async fn stop_before_first_capture_still_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut source = Blank { grabs: 0 };

        run(&mut source, Duration::from_secs(60), &nested, std::future::ready(()))
            .await
            .unwrap();

        assert_eq!(source.grabs, 0);
        assert!(nested.is_dir());
        assert!(screenshots(&nested).is_empty());
    }

    /// Records whether the stop future had been polled when the first grab
    /// happened, then fails to end the run.
    struct ChecksArmed {
        armed: Arc<AtomicBool>,
        armed_at_first_grab: Option<bool>,
    }

    impl ScreenSource for ChecksArmed {
        fn grab(&mut self) -> Result<RgbaImage> {
            self.armed_at_first_grab = Some(self.armed.load(Ordering::SeqCst));
            bail!("done")
        }
    }

    #[tokio::test]
    async fn stop_signal_is_armed_before_first_capture() {
        let dir = tempfile::tempdir().unwrap();
        let armed = Arc::new(AtomicBool::new(false));
        let stop = {
            let armed = armed.clone();
            std::future::poll_fn(move |_| {
                armed.store(true, Ordering::SeqCst);
                Poll::<()>::Pending
            })
        };
        let mut source = ChecksArmed {
            armed,
            armed_at_first_grab: None,
        };

        assert!(
            run(&mut source, Duration::from_secs(1), dir.path(), stop)
                .await
                .is_err()
        );
        assert_eq!(source.armed_at_first_grab, Some(true));
    }

    #[tokio::test]
    async fn capture_failure_ends_the_run() {
        let dir = tempfile::tempdir().unwrap();

        let error = run(
            &mut Broken,
            Duration::from_secs(1),
            dir.path(),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();

        assert!(error.to_string().contains("display went away"));
        assert!(screenshots(dir.path()).is_empty());
    }
}
