// QR rendering: encode with qrcode, paint modules into a grayscale image

use image::{GrayImage, Luma};
use qrcode::{Color, QrCode};

use crate::constants::{QR_MODULE_PX, QR_QUIET_ZONE_MODULES};
use crate::error::{CodeManagerError, Result};

/// Render `data` as a black-on-white QR image with a quiet zone.
pub fn render(data: &str) -> Result<GrayImage> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| CodeManagerError::Generation(format!("QR encode error: {}", e)))?;
    let modules = code.to_colors();
    let width = code.width() as u32;

    let size = (width + 2 * QR_QUIET_ZONE_MODULES) * QR_MODULE_PX;
    let mut img = GrayImage::from_pixel(size, size, Luma([255u8]));

    for (i, color) in modules.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let x = (i as u32 % width + QR_QUIET_ZONE_MODULES) * QR_MODULE_PX;
        let y = (i as u32 / width + QR_QUIET_ZONE_MODULES) * QR_MODULE_PX;
        for dx in 0..QR_MODULE_PX {
            for dy in 0..QR_MODULE_PX {
                img.put_pixel(x + dx, y + dy, Luma([0u8]));
            }
        }
    }

    Ok(img)
}
