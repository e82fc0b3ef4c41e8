use eframe::egui::ColorImage;
use image::imageops::FilterType;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ArtworkError {
    #[error("artwork request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("artwork request to {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to decode artwork: {0}")]
    Decode(#[from] image::ImageError),
}

pub trait ArtworkSource {
    fn fetch(&self, url: &str) -> Result<ColorImage, ArtworkError>;
}

/// Downloads cover art over HTTP and scales it to a fixed square.
pub struct HttpArtwork {
    client: reqwest::blocking::Client,
    side: u32,
}

impl HttpArtwork {
    pub fn new(side: u32, timeout: Duration) -> Result<Self, ArtworkError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client, side })
    }
}

impl ArtworkSource for HttpArtwork {
    fn fetch(&self, url: &str) -> Result<ColorImage, ArtworkError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArtworkError::Status {
                url: url.to_owned(),
                status,
            });
        }
        let bytes = response.bytes()?;
        tracing::debug!(url, len = bytes.len(), "downloaded artwork");
        decode_artwork(&bytes, self.side)
    }
}

/// Decodes `bytes` and stretches the result to exactly `side` x `side`.
pub fn decode_artwork(bytes: &[u8], side: u32) -> Result<ColorImage, ArtworkError> {
    let image = image::load_from_memory(bytes)?;
    let image = image
        .resize_exact(side, side, FilterType::Lanczos3)
        .to_rgba8();
    let size = [image.width() as usize, image.height() as usize];
    let pixels = image.into_raw();
    Ok(ColorImage::from_rgba_unmultiplied(size, &pixels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, _| {
            if x % 2 == 0 {
                Rgba([255u8, 0, 0, 255])
            } else {
                Rgba([0u8, 0, 255, 255])
            }
        });
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn decode_artwork_fails_on_garbage_input() {
        let result = decode_artwork(&[0u8, 1u8, 2u8, 3u8], 16);
        assert!(matches!(result, Err(ArtworkError::Decode(_))));
    }

    #[test]
    fn wide_image_is_stretched_to_square() {
        let image = decode_artwork(&png_bytes(40, 10), 32).unwrap();
        assert_eq!(image.size, [32, 32]);
        assert_eq!(image.pixels.len(), 32 * 32);
    }

    #[test]
    fn small_image_is_upscaled() {
        let image = decode_artwork(&png_bytes(3, 5), 20).unwrap();
        assert_eq!(image.size, [20, 20]);
        assert!(image.pixels.iter().all(|p| p.a() == 255));
    }

    #[test]
    fn unreachable_host_is_a_request_error() {
        let fetcher = HttpArtwork::new(16, Duration::from_secs(1)).unwrap();
        let result = fetcher.fetch("http://127.0.0.1:9/cover.jpg");
        assert!(matches!(result, Err(ArtworkError::Request(_))));
    }

    #[test]
    fn not_found_is_a_status_error() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            stream
                .write_all(
                    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                )
                .unwrap();
        });

        let fetcher = HttpArtwork::new(16, Duration::from_secs(5)).unwrap();
        let url = format!("http://{addr}/cover.jpg");
        match fetcher.fetch(&url) {
            Err(ArtworkError::Status { url: failed, status }) => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert_eq!(failed, url);
            }
            Err(other) => panic!("expected a status error, got {other}"),
            Ok(_) => panic!("expected a status error, got an image"),
        }
        server.join().unwrap();
    }

    #[test]
    fn malformed_url_is_a_request_error() {
        let fetcher = HttpArtwork::new(16, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            fetcher.fetch("not a url"),
            Err(ArtworkError::Request(_))
        ));
    }
}
