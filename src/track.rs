use crate::config::{AuthConfig, Credentials};
use rspotify::{
    model::{CurrentlyPlayingContext, PlayableItem},
    prelude::*, scopes, AuthCodeSpotify, Config as SpotifyConfig,
    Credentials as SpotifyCredentials, OAuth,
};

/// What is currently playing, reduced to the fields the display needs.
///
/// Two snapshots refer to the same artwork when their `artwork_url`s match;
/// the poll loop never compares the other fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub track_name: String,
    pub artist_name: String,
    pub artwork_url: String,
}

impl Snapshot {
    /// Builds a snapshot from the first artist and the first (largest) album
    /// image. Either one missing means there is nothing to show.
    pub fn from_parts(
        track_name: &str,
        first_artist: Option<&str>,
        first_image_url: Option<&str>,
    ) -> Option<Self> {
        Some(Self {
            track_name: track_name.to_owned(),
            artist_name: first_artist?.to_owned(),
            artwork_url: first_image_url?.to_owned(),
        })
    }

    pub fn same_artwork(&self, url: Option<&str>) -> bool {
        url == Some(self.artwork_url.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Spotify API request failed: {0}")]
    Api(#[from] rspotify::ClientError),
}

pub trait TrackSource {
    /// Asks the service what is playing right now. `Ok(None)` covers both an
    /// idle player and a playing item that has no usable artwork.
    fn current(&self) -> Result<Option<Snapshot>, TrackError>;

    /// Same as [`TrackSource::current`] with every failure collapsed into
    /// "nothing this tick".
    fn get_current(&self) -> Option<Snapshot> {
        match self.current() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!("Error getting current track: {err}");
                None
            }
        }
    }
}

pub struct SpotifyTracks {
    client: AuthCodeSpotify,
}

impl SpotifyTracks {
    /// Runs the interactive authorization-code flow. With the token cache
    /// enabled a previously stored token is reused without prompting.
    pub fn authenticate(creds: &Credentials, auth: &AuthConfig) -> Result<Self, TrackError> {
        let oauth = OAuth {
            redirect_uri: creds.redirect_uri.clone(),
            scopes: scopes!("user-read-currently-playing", "user-read-playback-state"),
            ..Default::default()
        };
        let config = SpotifyConfig {
            token_cached: auth.token_cache,
            cache_path: auth.cache_path.clone(),
            ..Default::default()
        };
        let client = AuthCodeSpotify::with_config(
            SpotifyCredentials::new(&creds.client_id, &creds.client_secret),
            oauth,
            config,
        );

        let url = client.get_authorize_url(false)?;
        client.prompt_for_token(&url)?;
        tracing::info!("Authenticated with Spotify");

        Ok(Self { client })
    }
}

impl TrackSource for SpotifyTracks {
    fn current(&self) -> Result<Option<Snapshot>, TrackError> {
        let context = self.client.current_playing(None, None::<Vec<_>>)?;
        Ok(context.and_then(snapshot_from))
    }
}

/// Reduces a "currently playing" response to a snapshot. Episodes, missing
/// items, tracks without artists and albums without images yield nothing.
/// Spotify lists album images largest-first, so the first one is used.
pub fn snapshot_from(context: CurrentlyPlayingContext) -> Option<Snapshot> {
    match context.item? {
        PlayableItem::Track(track) => Snapshot::from_parts(
            &track.name,
            track.artists.first().map(|artist| artist.name.as_str()),
            track.album.images.first().map(|image| image.url.as_str()),
        ),
        PlayableItem::Episode(_) => None,
    }
}
