use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::foundation::error::{ConvError, ConvResult};
use crate::raster::Raster;

pub fn decode_raster(bytes: &[u8]) -> ConvResult<Raster> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ConvError::invalid_input(format!("decode image: {e}")))?;
    Raster::from_dynamic(&img)
}

pub fn load_raster(path: &Path) -> ConvResult<Raster> {
    let bytes = std::fs::read(path)
        .map_err(|e| ConvError::invalid_input(format!("read '{}': {e}", path.display())))?;
    decode_raster(&bytes).map_err(|e| match e {
        ConvError::InvalidInput(msg) => {
            ConvError::invalid_input(format!("'{}': {msg}", path.display()))
        }
        other => other,
    })
}

/// Resolve an output extension such as `png` to an encodable format.
pub fn format_for_extension(ext: &str) -> ConvResult<image::ImageFormat> {
    let format = image::ImageFormat::from_extension(ext)
        .ok_or_else(|| ConvError::config(format!("unknown image extension '{ext}'")))?;
    if !format.writing_enabled() {
        return Err(ConvError::config(format!(
            "image format {format:?} cannot be written"
        )));
    }
    Ok(format)
}

pub fn encode_raster(raster: &Raster, format: image::ImageFormat) -> ConvResult<Vec<u8>> {
    let img = raster.to_dynamic();
    // JPEG has no alpha channel.
    let img = if format == image::ImageFormat::Jpeg && img.color().has_alpha() {
        image::DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        img
    };
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), format)
        .with_context(|| format!("encode {format:?}"))?;
    Ok(out)
}

/// Encode and write `raster` to `path`, format chosen by extension.
///
/// The bytes land in a hidden sibling first and are renamed into place, so `path` either
/// holds a complete image or does not exist.
pub fn save_raster(raster: &Raster, path: &Path) -> ConvResult<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConvError::config(format!("'{}' has no extension", path.display())))?;
    let bytes = encode_raster(raster, format_for_extension(ext)?)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ConvError::invalid_input(format!("bad output path '{}'", path.display())))?;
    let partial = path.with_file_name(format!(".{file_name}.partial"));
    std::fs::write(&partial, &bytes)
        .with_context(|| format!("write '{}'", partial.display()))?;
    if let Err(e) = std::fs::rename(&partial, path) {
        let _ = std::fs::remove_file(&partial);
        return Err(anyhow::Error::new(e)
            .context(format!("rename into '{}'", path.display()))
            .into());
    }
    Ok(())
}

/// `<out_dir>/<input-basename>_<strategy>_result.<ext>`
pub fn output_path_for(input: &Path, out_dir: &Path, strategy: &str, ext: &str) -> ConvResult<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConvError::invalid_input(format!("no file name in '{}'", input.display())))?;
    Ok(out_dir.join(format!("{stem}_{strategy}_result.{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_uses_basename_strategy_and_extension() {
        let p = output_path_for(Path::new("/in/cat.photo.jpg"), Path::new("/out"), "pooled", "png")
            .unwrap();
        assert_eq!(p, PathBuf::from("/out/cat.photo_pooled_result.png"));
    }

    #[test]
    fn png_round_trip_preserves_pixels() {
        let rgb: Vec<u8> = (0..5 * 6 * 3).map(|v| (v * 7) as u8).collect();
        let r = Raster::from_rgb8(5, 6, &rgb).unwrap();
        let bytes = encode_raster(&r, image::ImageFormat::Png).unwrap();
        assert_eq!(decode_raster(&bytes).unwrap(), r);
    }

    #[test]
    fn garbage_is_invalid_input() {
        assert!(matches!(
            decode_raster(b"definitely not an image"),
            Err(ConvError::InvalidInput(_))
        ));
    }

    #[test]
    fn unknown_extension_is_configuration_error() {
        assert!(matches!(
            format_for_extension("nope"),
            Err(ConvError::Configuration(_))
        ));
        assert_eq!(format_for_extension("PNG").unwrap(), image::ImageFormat::Png);
    }
}
