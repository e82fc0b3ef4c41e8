use crate::{
    artwork::ArtworkSource,
    track::{Snapshot, TrackSource},
};
use eframe::egui::ColorImage;
use std::{
    sync::mpsc::{self, RecvTimeoutError, TryRecvError},
    thread,
    time::{Duration, Instant},
};

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Sent from the UI thread to the poll worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCommand {
    Refresh,
    Shutdown,
}

/// Sent from the poll worker to the UI thread.
pub enum DisplayCommand {
    ShowArtwork { snapshot: Snapshot, image: ColorImage },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Unchanged,
    Displayed(Snapshot),
    FetchFailed(Snapshot),
}

type Waker = Box<dyn Fn() + Send>;

/// The poll-compare-update loop. Owns the only record of which artwork is
/// on screen.
pub struct Poller<T, A> {
    tracks: T,
    artwork: A,
    display_tx: mpsc::Sender<DisplayCommand>,
    waker: Option<Waker>,
    last_shown_url: Option<String>,
}

impl<T: TrackSource, A: ArtworkSource> Poller<T, A> {
    pub fn new(tracks: T, artwork: A, display_tx: mpsc::Sender<DisplayCommand>) -> Self {
        Self {
            tracks,
            artwork,
            display_tx,
            waker: None,
            last_shown_url: None,
        }
    }

    /// Called after every image handed to the display, so an idle UI
    /// repaints without waiting for input.
    pub fn with_waker(mut self, waker: impl Fn() + Send + 'static) -> Self {
        self.waker = Some(Box::new(waker));
        self
    }

    pub fn last_shown_url(&self) -> Option<&str> {
        self.last_shown_url.as_deref()
    }

    pub fn tick(&mut self) -> TickOutcome {
        let Some(snapshot) = self.tracks.get_current() else {
            return TickOutcome::Idle;
        };

        if snapshot.same_artwork(self.last_shown_url()) {
            return TickOutcome::Unchanged;
        }

        let image = match self.artwork.fetch(&snapshot.artwork_url) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(url = %snapshot.artwork_url, "Error displaying artwork: {err}");
                return TickOutcome::FetchFailed(snapshot);
            }
        };

        self.last_shown_url = Some(snapshot.artwork_url.clone());
        if self
            .display_tx
            .send(DisplayCommand::ShowArtwork {
                snapshot: snapshot.clone(),
                image,
            })
            .is_err()
        {
            tracing::debug!("display channel closed; artwork dropped");
        }
        if let Some(wake) = &self.waker {
            wake();
        }
        tracing::info!(
            "Now playing: {} by {}",
            snapshot.track_name,
            snapshot.artist_name
        );

        TickOutcome::Displayed(snapshot)
    }

    /// Ticks once immediately, then on every `interval` timeout or
    /// `Refresh`, until `Shutdown` arrives or the sender is dropped.
    pub fn run(mut self, commands: mpsc::Receiver<PollCommand>, interval: Duration) {
        self.tick();
        loop {
            match commands.recv_timeout(interval) {
                Ok(PollCommand::Refresh) => {
                    if !drain_refreshes(&commands) {
                        break;
                    }
                    tracing::debug!("manual refresh");
                    self.tick();
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.tick();
                }
                Ok(PollCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("poll loop stopped");
    }
}

/// Swallows refreshes queued behind the one being handled so a burst costs
/// a single tick. Returns false when a shutdown was found instead.
fn drain_refreshes(commands: &mpsc::Receiver<PollCommand>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(PollCommand::Refresh) => continue,
            Err(TryRecvError::Empty) => return true,
            Ok(PollCommand::Shutdown) | Err(TryRecvError::Disconnected) => return false,
        }
    }
}

/// Owns the worker thread running [`Poller::run`].
pub struct PollerHandle {
    command_tx: Option<mpsc::Sender<PollCommand>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl PollerHandle {
    /// Spawns the worker. `setup` runs on the worker thread first and is
    /// where slow one-time work such as authentication belongs; if it fails
    /// the worker logs the error and exits without polling.
    pub fn spawn<F, T, A>(
        setup: F,
        display_tx: mpsc::Sender<DisplayCommand>,
        interval: Duration,
        waker: impl Fn() + Send + 'static,
    ) -> std::io::Result<Self>
    where
        F: FnOnce() -> anyhow::Result<(T, A)> + Send + 'static,
        T: TrackSource,
        A: ArtworkSource,
    {
        let (command_tx, command_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("artwork-poller".to_owned())
            .spawn(move || {
                let (tracks, artwork) = match setup() {
                    Ok(sources) => sources,
                    Err(err) => {
                        tracing::error!("Spotify connection error: {err:#}");
                        return;
                    }
                };
                Poller::new(tracks, artwork, display_tx)
                    .with_waker(waker)
                    .run(command_rx, interval);
            })?;

        Ok(Self {
            command_tx: Some(command_tx),
            worker: Some(worker),
        })
    }

    /// Requests an immediate tick. Returns false once the worker is gone.
    pub fn refresh(&self) -> bool {
        self.command_tx
            .as_ref()
            .is_some_and(|tx| tx.send(PollCommand::Refresh).is_ok())
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Signals the worker to stop and joins it if it exits promptly. A worker
    /// stuck in the OAuth prompt or a slow request is left detached.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(PollCommand::Shutdown);
        }
        let Some(worker) = self.worker.take() else {
            return;
        };

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        if worker.is_finished() {
            if worker.join().is_err() {
                tracing::error!("poll worker panicked");
            }
        } else {
            tracing::warn!("poll worker still busy at exit; detaching");
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{artwork::ArtworkError, track::TrackError};
    use eframe::egui::Color32;
    use std::{cell::RefCell, collections::VecDeque};

    struct Script(RefCell<VecDeque<Option<Snapshot>>>);

    impl TrackSource for Script {
        fn current(&self) -> Result<Option<Snapshot>, TrackError> {
            Ok(self.0.borrow_mut().pop_front().flatten())
        }
    }

    struct Solid;

    impl ArtworkSource for Solid {
        fn fetch(&self, _url: &str) -> Result<ColorImage, ArtworkError> {
            Ok(ColorImage::new([1, 1], vec![Color32::BLACK]))
        }
    }

    fn snap(track: &str, url: &str) -> Option<Snapshot> {
        Snapshot::from_parts(track, Some("artist"), Some(url))
    }

    #[test]
    fn refresh_runs_an_immediate_tick() {
        let (display_tx, display_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();
        let poller = Poller::new(
            Script(RefCell::new(VecDeque::from([None, snap("t", "A")]))),
            Solid,
            display_tx,
        );

        let worker = thread::spawn(move || poller.run(command_rx, Duration::from_secs(3600)));
        command_tx.send(PollCommand::Refresh).unwrap();

        let received = display_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let DisplayCommand::ShowArtwork { snapshot, .. } = received;
        assert_eq!(snapshot.artwork_url, "A");

        command_tx.send(PollCommand::Shutdown).unwrap();
        worker.join().unwrap();
    }

    struct Counting(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    impl TrackSource for Counting {
        fn current(&self) -> Result<Option<Snapshot>, TrackError> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(None)
        }
    }

    #[test]
    fn burst_of_refreshes_costs_one_tick() {
        use std::sync::{atomic::Ordering, Arc};

        let polls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (display_tx, _display_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();
        for _ in 0..5 {
            command_tx.send(PollCommand::Refresh).unwrap();
        }

        let poller = Poller::new(Counting(polls.clone()), Solid, display_tx);
        let worker = thread::spawn(move || poller.run(command_rx, Duration::from_secs(3600)));

        let deadline = Instant::now() + Duration::from_secs(5);
        while polls.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(100));
        assert_eq!(polls.load(Ordering::SeqCst), 2);

        command_tx.send(PollCommand::Shutdown).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn shutdown_behind_refreshes_wins() {
        let (command_tx, command_rx) = mpsc::channel();
        command_tx.send(PollCommand::Refresh).unwrap();
        command_tx.send(PollCommand::Shutdown).unwrap();
        assert!(!drain_refreshes(&command_rx));

        command_tx.send(PollCommand::Refresh).unwrap();
        assert!(drain_refreshes(&command_rx));
    }

    #[test]
    fn run_stops_when_commands_disconnect() {
        let (display_tx, _display_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel::<PollCommand>();
        let poller = Poller::new(Script(RefCell::new(VecDeque::new())), Solid, display_tx);
        drop(command_tx);
        poller.run(command_rx, Duration::from_millis(10));
    }
}
