//! Turns the session's current frame into a terminal image protocol.

use folio_application::{Frame, RenderSession};
use folio_core::Rotation;
use folio_engine::{PageImage, RenderedPage, RgbaBitmap, ViewportGeometry as _};
use log::warn;
use ratatui::layout::Rect;
use ratatui_image::Resize;
use ratatui_image::picker::Picker;
use ratatui_image::protocol::Protocol as ImageProtocol;

use crate::graphics::TerminalViewport;

#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameKey {
    Raster {
        generation: u64,
        area: Rect,
    },
    Image {
        page: u32,
        rotation: Rotation,
        scale: f32,
        fit: bool,
        area: Rect,
    },
}

#[derive(Default)]
pub(crate) struct ReaderView {
    shown: Option<FrameKey>,
    protocol: Option<ImageProtocol>,
    last_error: Option<String>,
}

impl ReaderView {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn protocol(&self) -> Option<&ImageProtocol> {
        self.protocol.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Rebuilds the image protocol when the visible frame changed. A frame
    /// that fails to decode keeps the previous image on screen.
    pub fn sync(&mut self, session: &RenderSession, picker: &Picker, viewport: TerminalViewport) {
        let (key, result) = match session.frame() {
            Some(Frame::Raster(page)) => {
                let key = FrameKey::Raster {
                    generation: page.generation,
                    area: viewport.area,
                };
                if self.shown == Some(key) {
                    return;
                }
                (key, raster_image(page, viewport))
            }
            Some(Frame::Image(image)) => {
                let state = session.viewport();
                let key = FrameKey::Image {
                    page: state.current_page,
                    rotation: state.rotation,
                    scale: state.scale,
                    fit: state.fit,
                    area: viewport.area,
                };
                if self.shown == Some(key) {
                    return;
                }
                (
                    key,
                    archive_image(image, state.rotation, state.fit, state.scale, viewport),
                )
            }
            Some(Frame::Text(_)) | None => {
                self.shown = None;
                self.protocol = None;
                return;
            }
        };

        self.shown = Some(key);
        let protocol = result.and_then(|image| {
            let size = Rect::new(0, 0, viewport.area.width, viewport.area.height);
            picker
                .new_protocol(image, size, Resize::Fit(None))
                .map_err(|err| anyhow::anyhow!("{err:?}"))
        });
        match protocol {
            Ok(protocol) => {
                self.protocol = Some(protocol);
                self.last_error = None;
            }
            Err(err) => {
                warn!("could not display page: {err:#}");
                self.last_error = Some(format!("{err:#}"));
            }
        }
    }
}

fn raster_image(
    page: &RenderedPage,
    viewport: TerminalViewport,
) -> anyhow::Result<image::DynamicImage> {
    let image = page.bitmap.clone().into_image()?;
    Ok(frame_to_viewport(&image::DynamicImage::ImageRgba8(image), viewport))
}

fn archive_image(
    page: &PageImage,
    rotation: Rotation,
    fit: bool,
    scale: f32,
    viewport: TerminalViewport,
) -> anyhow::Result<image::DynamicImage> {
    let mut image = page.decode()?;
    if rotation.is_quarter() {
        let bitmap = RgbaBitmap::from_image(image.to_rgba8()).rotated_quarter()?;
        image = image::DynamicImage::ImageRgba8(bitmap.into_image()?);
    }
    if fit {
        return Ok(image);
    }
    let width = ((image.width() as f32) * scale).round().max(1.0) as u32;
    let height = ((image.height() as f32) * scale).round().max(1.0) as u32;
    let scaled = image.resize_exact(width, height, image::imageops::FilterType::Triangle);
    Ok(frame_to_viewport(&scaled, viewport))
}

/// Centers `full` on a white canvas the size of the viewport, cropping what
/// does not fit.
fn frame_to_viewport(full: &image::DynamicImage, viewport: TerminalViewport) -> image::DynamicImage {
    let size = viewport.available_size();
    let view_w = size.width.max(1);
    let view_h = size.height.max(1);
    let (img_w, img_h) = (full.width(), full.height());

    let mut canvas: image::DynamicImage =
        image::ImageBuffer::from_pixel(view_w, view_h, image::Rgba([255u8, 255u8, 255u8, 255u8]))
            .into();

    let crop_x = img_w.saturating_sub(view_w) / 2;
    let crop_y = img_h.saturating_sub(view_h) / 2;
    let crop_w = view_w.min(img_w);
    let crop_h = view_h.min(img_h);
    if crop_w > 0 && crop_h > 0 {
        let region = full.crop_imm(crop_x, crop_y, crop_w, crop_h);
        let dest_x = i64::from(view_w.saturating_sub(img_w) / 2);
        let dest_y = i64::from(view_h.saturating_sub(img_h) / 2);
        image::imageops::overlay(&mut canvas, &region, dest_x, dest_y);
    }
    canvas
}
