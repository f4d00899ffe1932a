use image::{ColorType, ImageFormat, ImageReader};
use std::path::Path;

/// Short textual description of an image; the pixels themselves are not sent
/// to text-only models.
pub fn describe(path: &Path, file_name: &str) -> image::ImageResult<String> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format();
    let img = reader.decode()?;

    Ok(format!(
        "Image file: {}\nDimensions: {}x{}\nFormat: {}\nMode: {}\n\n{}",
        file_name,
        img.width(),
        img.height(),
        format.map(format_name).unwrap_or_else(|| "UNKNOWN".to_string()),
        color_mode(img.color()),
        crate::constants::IMAGE_VISION_NOTE
    ))
}

fn format_name(format: ImageFormat) -> String {
    format!("{:?}", format).to_uppercase()
}

/// Conventional short names for pixel layouts ("RGB", "RGBA", "L", ...).
fn color_mode(color: ColorType) -> String {
    match color {
        ColorType::L8 => "L".to_string(),
        ColorType::La8 => "LA".to_string(),
        ColorType::Rgb8 => "RGB".to_string(),
        ColorType::Rgba8 => "RGBA".to_string(),
        ColorType::L16 => "I;16".to_string(),
        ColorType::La16 => "LA;16".to_string(),
        ColorType::Rgb16 | ColorType::Rgb32F => "RGB;16".to_string(),
        ColorType::Rgba16 | ColorType::Rgba32F => "RGBA;16".to_string(),
        other => format!("{:?}", other),
    }
}
