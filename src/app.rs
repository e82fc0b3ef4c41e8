use crate::{
    artwork::HttpArtwork,
    config::{Config, Credentials},
    poller::{DisplayCommand, PollerHandle},
    track::{Snapshot, SpotifyTracks},
};
use anyhow::Context;
use eframe::egui::{
    self, Color32, Key, TextureHandle, TextureOptions, ViewportBuilder, ViewportCommand,
};
use std::sync::mpsc::{self, TryRecvError};

/// Full-window artwork display. Owns the texture on screen and the handle of
/// the worker feeding it.
pub struct ArtworkApp {
    display_rx: Option<mpsc::Receiver<DisplayCommand>>,
    poller: Option<PollerHandle>,
    texture: Option<TextureHandle>,
    current: Option<Snapshot>,
}

impl ArtworkApp {
    pub fn new(display_rx: mpsc::Receiver<DisplayCommand>, poller: Option<PollerHandle>) -> Self {
        Self {
            display_rx: Some(display_rx),
            poller,
            texture: None,
            current: None,
        }
    }

    /// Starts the Spotify worker against `ctx` and builds the app around it.
    pub fn spawn_spotify(ctx: &egui::Context, config: &Config) -> Self {
        let (display_tx, display_rx) = mpsc::channel();
        let setup_config = config.clone();
        let repaint_ctx = ctx.clone();

        let poller = PollerHandle::spawn(
            move || {
                let creds = Credentials::from_env()?;
                tracing::debug!(?creds, "credentials loaded");
                let tracks = SpotifyTracks::authenticate(&creds, &setup_config.auth)?;
                let artwork = HttpArtwork::new(
                    setup_config.window.side(),
                    setup_config.poll.artwork_timeout(),
                )?;
                Ok((tracks, artwork))
            },
            display_tx,
            config.poll.interval(),
            move || repaint_ctx.request_repaint(),
        );

        let poller = match poller {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!("failed to start poll worker: {err}");
                None
            }
        };

        Self::new(display_rx, poller)
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn texture(&self) -> Option<&TextureHandle> {
        self.texture.as_ref()
    }

    /// Applies every queued display command; only the newest image survives.
    pub fn drain_display_channel(&mut self, ctx: &egui::Context) {
        let mut clear_rx = false;
        if let Some(rx) = self.display_rx.as_ref() {
            loop {
                match rx.try_recv() {
                    Ok(DisplayCommand::ShowArtwork { snapshot, image }) => {
                        match self.texture.as_mut() {
                            Some(texture) => texture.set(image, TextureOptions::LINEAR),
                            None => {
                                self.texture = Some(ctx.load_texture(
                                    "now_playing.artwork",
                                    image,
                                    TextureOptions::LINEAR,
                                ));
                            }
                        }
                        self.current = Some(snapshot);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        clear_rx = true;
                        break;
                    }
                }
            }
        }

        if clear_rx {
            tracing::debug!("display channel disconnected");
            self.display_rx = None;
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        let (refresh, quit) =
            ctx.input(|i| (fresh_press(&i.events, Key::Space), i.key_pressed(Key::Escape)));

        if refresh {
            let sent = self.poller.as_ref().is_some_and(PollerHandle::refresh);
            if !sent {
                tracing::debug!("refresh ignored; no poll worker running");
            }
        }

        if quit {
            ctx.send_viewport_cmd(ViewportCommand::Close);
        }
    }

    fn paint_artwork(&self, ui: &mut egui::Ui) {
        let rect = ui.max_rect();
        if let Some(texture) = &self.texture {
            let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
            ui.painter().image(texture.id(), rect, uv, Color32::WHITE);
        }
    }
}

impl eframe::App for ArtworkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_display_channel(ctx);
        self.handle_keys(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(Color32::BLACK))
            .show(ctx, |ui| self.paint_artwork(ui));
    }
}

impl Drop for ArtworkApp {
    fn drop(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.shutdown();
        }
    }
}

/// True when `key` went down this frame, ignoring OS key-repeat events.
fn fresh_press(events: &[egui::Event], key: Key) -> bool {
    events.iter().any(|event| {
        matches!(
            event,
            egui::Event::Key { key: pressed_key, pressed: true, repeat: false, .. }
                if *pressed_key == key
        )
    })
}

pub fn native_options(config: &Config) -> eframe::NativeOptions {
    let side = config.window.side() as f32;
    eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_title(config.window.title.clone())
            .with_inner_size([side, side])
            .with_resizable(false),
        ..Default::default()
    }
}

pub fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Spotify Artwork Display started");
    tracing::info!("Press SPACE to manually refresh");
    tracing::info!("Press ESCAPE to quit");

    let title = config.window.title.clone();
    let options = native_options(&config);
    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| -> Result<Box<dyn eframe::App>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(Box::new(ArtworkApp::spawn_spotify(&cc.egui_ctx, &config)))
        }),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))
    .context("Failed to start the display window")
}
