use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::models::job::CustomizationMap;
use crate::models::product::{CustomizationZone, RenderStyle};

/// Thumbnail bounding box, fixed for list views.
const THUMBNAIL_SIZE: u32 = 300;

/// Thumbnails are always JPEG at this quality, regardless of the primary
/// output format.
const THUMBNAIL_JPEG_QUALITY: u8 = 85;

const PRIMARY_JPEG_QUALITY: u8 = 90;

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("failed to decode overlay image: {0}")]
    DecodeOverlay(image::ImageError),

    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(image::ImageError),
}

/// Composite the AI-generated overlay onto the base product image per zone.
///
/// The base image is optional by design: if it is absent, undecodable, or no
/// zone carries a customization, the overlay itself is re-encoded into the
/// requested format and returned. An undecodable overlay is always fatal; there
/// is nothing to show without it. Deterministic for fixed inputs.
pub fn compose(
    base: Option<&[u8]>,
    overlay: &[u8],
    zones: &[CustomizationZone],
    customizations: &CustomizationMap,
    output_format: &str,
) -> Result<Vec<u8>, ComposeError> {
    let overlay_img = image::load_from_memory(overlay).map_err(ComposeError::DecodeOverlay)?;

    let base_img = match base {
        Some(bytes) => match image::load_from_memory(bytes) {
            Ok(img) => Some(img),
            Err(e) => {
                tracing::warn!(error = %e, "base image undecodable, composing without it");
                None
            }
        },
        None => None,
    };

    // Only zones the customer actually customized get a patch; a configured
    // zone with no supplied value has nothing to render.
    let customized_zones: Vec<&CustomizationZone> = zones
        .iter()
        .filter(|z| {
            customizations
                .get(&z.id)
                .is_some_and(|v| !v.is_empty())
        })
        .collect();

    let Some(base_img) = base_img else {
        return encode(&overlay_img, output_format);
    };
    if customized_zones.is_empty() {
        return encode(&overlay_img, output_format);
    }

    let mut canvas = base_img.to_rgba8();
    for zone in customized_zones {
        let patch = overlay_img
            .resize_exact(zone.width, zone.height, FilterType::Lanczos3)
            .to_rgba8();
        let patch = apply_render_style(patch, zone.render_style);
        image::imageops::overlay(&mut canvas, &patch, i64::from(zone.x), i64::from(zone.y));
    }

    encode(&DynamicImage::ImageRgba8(canvas), output_format)
}

/// Resize to fit the fixed thumbnail box, preserving aspect ratio and never
/// upscaling beyond the source. Always JPEG.
pub fn create_thumbnail(bytes: &[u8]) -> Result<Vec<u8>, ComposeError> {
    let img = image::load_from_memory(bytes).map_err(ComposeError::Decode)?;

    let thumb = if img.width() <= THUMBNAIL_SIZE && img.height() <= THUMBNAIL_SIZE {
        img
    } else {
        img.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE)
    };

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, THUMBNAIL_JPEG_QUALITY);
    thumb
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(ComposeError::Encode)?;
    Ok(buf)
}

/// MIME type for an output format string.
pub fn content_type(output_format: &str) -> &'static str {
    match output_format {
        "jpeg" | "jpg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

/// File extension for an output format string.
pub fn extension(output_format: &str) -> &'static str {
    match output_format {
        "jpeg" | "jpg" => "jpg",
        "webp" => "webp",
        _ => "png",
    }
}

fn encode(img: &DynamicImage, output_format: &str) -> Result<Vec<u8>, ComposeError> {
    let mut buf = Vec::new();
    match output_format {
        "jpeg" | "jpg" => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, PRIMARY_JPEG_QUALITY);
            img.to_rgb8()
                .write_with_encoder(encoder)
                .map_err(ComposeError::Encode)?;
        }
        "webp" => {
            img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::WebP)
                .map_err(ComposeError::Encode)?;
        }
        _ => {
            img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
                .map_err(ComposeError::Encode)?;
        }
    }
    Ok(buf)
}

/// Post-process a zone patch so the merged result reads as the zone's
/// configured surface treatment.
fn apply_render_style(patch: RgbaImage, style: RenderStyle) -> RgbaImage {
    match style {
        RenderStyle::Flat => patch,
        // Engraved: inset look, darkened overall with a darker edge ring.
        RenderStyle::Engraved => shade_edges(image::imageops::brighten(&patch, -45), -40),
        // Embossed: raised look, lightened overall with a lighter edge ring.
        RenderStyle::Embossed => shade_edges(image::imageops::brighten(&patch, 35), 30),
    }
}

/// Brighten/darken a 2-pixel border ring to fake depth at the patch boundary.
fn shade_edges(mut patch: RgbaImage, delta: i16) -> RgbaImage {
    const RING: u32 = 2;
    let (w, h) = patch.dimensions();
    for y in 0..h {
        for x in 0..w {
            let on_edge = x < RING || y < RING || x >= w.saturating_sub(RING) || y >= h.saturating_sub(RING);
            if !on_edge {
                continue;
            }
            let px = patch.get_pixel_mut(x, y);
            for channel in &mut px.0[..3] {
                *channel = (i16::from(*channel) + delta).clamp(0, 255) as u8;
            }
        }
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::CustomizationValue;
    use crate::models::product::ZoneType;

    fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn test_zone(id: &str, style: RenderStyle) -> CustomizationZone {
        CustomizationZone {
            id: id.to_string(),
            name: id.to_string(),
            zone_type: ZoneType::Text,
            required: false,
            max_length: None,
            render_style: style,
            x: 10,
            y: 10,
            width: 32,
            height: 16,
        }
    }

    fn customized(id: &str) -> CustomizationMap {
        let mut map = CustomizationMap::new();
        map.insert(
            id.to_string(),
            CustomizationValue {
                text: Some("X".to_string()),
                ..Default::default()
            },
        );
        map
    }

    #[test]
    fn no_base_returns_overlay_reencoded() {
        let overlay = png_bytes(64, 64, [200, 10, 10, 255]);
        let zones = vec![test_zone("z", RenderStyle::Flat)];
        let out = compose(None, &overlay, &zones, &customized("z"), "png").unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn base_with_zero_zones_returns_overlay() {
        let base = png_bytes(128, 128, [0, 0, 255, 255]);
        let overlay = png_bytes(64, 64, [255, 255, 0, 255]);
        let out = compose(Some(&base), &overlay, &[], &CustomizationMap::new(), "png").unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        // Overlay dimensions, not base: nothing was composited.
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn composited_output_has_base_dimensions() {
        let base = png_bytes(128, 128, [0, 0, 255, 255]);
        let overlay = png_bytes(64, 64, [255, 255, 0, 255]);
        let zones = vec![test_zone("z", RenderStyle::Flat)];
        let out = compose(Some(&base), &overlay, &zones, &customized("z"), "png").unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (128, 128));
    }

    #[test]
    fn undecodable_base_falls_back_to_overlay() {
        let overlay = png_bytes(64, 64, [1, 2, 3, 255]);
        let zones = vec![test_zone("z", RenderStyle::Flat)];
        let out = compose(Some(b"not an image"), &overlay, &zones, &customized("z"), "png");
        assert!(out.is_ok());
    }

    #[test]
    fn undecodable_overlay_is_fatal() {
        let err = compose(None, b"garbage", &[], &CustomizationMap::new(), "png").unwrap_err();
        assert!(matches!(err, ComposeError::DecodeOverlay(_)));
    }

    #[test]
    fn compose_is_deterministic() {
        let base = png_bytes(100, 100, [10, 20, 30, 255]);
        let overlay = png_bytes(50, 50, [200, 100, 50, 255]);
        let zones = vec![test_zone("z", RenderStyle::Engraved)];
        let a = compose(Some(&base), &overlay, &zones, &customized("z"), "png").unwrap();
        let b = compose(Some(&base), &overlay, &zones, &customized("z"), "png").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn engraved_patch_is_darker_than_flat() {
        let base = png_bytes(100, 100, [128, 128, 128, 255]);
        let overlay = png_bytes(50, 50, [128, 128, 128, 255]);
        let flat = compose(
            Some(&base),
            &overlay,
            &[test_zone("z", RenderStyle::Flat)],
            &customized("z"),
            "png",
        )
        .unwrap();
        let engraved = compose(
            Some(&base),
            &overlay,
            &[test_zone("z", RenderStyle::Engraved)],
            &customized("z"),
            "png",
        )
        .unwrap();

        let mean = |bytes: &[u8]| {
            let img = image::load_from_memory(bytes).unwrap().to_rgba8();
            let sum: u64 = img.pixels().map(|p| u64::from(p.0[0])).sum();
            sum / u64::from(img.width() * img.height())
        };
        assert!(mean(&engraved) < mean(&flat));
    }

    #[test]
    fn thumbnail_never_upscales() {
        let small = png_bytes(100, 50, [5, 5, 5, 255]);
        let thumb = create_thumbnail(&small).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn thumbnail_fits_bounding_box_preserving_aspect() {
        let large = png_bytes(600, 400, [5, 5, 5, 255]);
        let thumb = create_thumbnail(&large).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 200));
        // Thumbnails are JPEG regardless of source format.
        assert_eq!(image::guess_format(&thumb).unwrap(), ImageFormat::Jpeg);
    }
}
