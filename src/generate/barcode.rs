// Code 128 rendering via barcoders (character set B)

use barcoders::sym::code128::Code128;
use image::{GrayImage, Luma};

use crate::constants::{BARCODE_HEIGHT_PX, BARCODE_MODULE_PX, BARCODE_QUIET_ZONE_MODULES};
use crate::error::{CodeManagerError, Result};

/// barcoders start-character selector for set B
const CHARSET_B: char = 'Ɓ';

/// Code 128 set B covers printable ASCII.
pub fn validate(data: &str) -> Result<()> {
    if data.is_empty() {
        return Err(CodeManagerError::InvalidContent(
            "Barcode data cannot be empty".to_string(),
        ));
    }
    if let Some(bad) = data.chars().find(|c| !(' '..='~').contains(c)) {
        return Err(CodeManagerError::InvalidContent(format!(
            "Character {:?} is not supported by Code 128",
            bad
        )));
    }
    Ok(())
}

/// Encode to bar modules (1 = bar, 0 = space).
pub fn encode(data: &str) -> Result<Vec<u8>> {
    validate(data)?;
    let code = Code128::new(format!("{}{}", CHARSET_B, data))
        .map_err(|e| CodeManagerError::InvalidContent(format!("Code 128: {}", e)))?;
    Ok(code.encode())
}

/// Render `data` as a Code 128 image with quiet zones on both sides.
pub fn render(data: &str) -> Result<GrayImage> {
    let modules = encode(data)?;
    let total_modules = modules.len() as u32 + 2 * BARCODE_QUIET_ZONE_MODULES;
    let mut img = GrayImage::from_pixel(
        total_modules * BARCODE_MODULE_PX,
        BARCODE_HEIGHT_PX,
        Luma([255u8]),
    );

    for (i, bar) in modules.iter().enumerate() {
        if *bar == 0 {
            continue;
        }
        let x0 = (i as u32 + BARCODE_QUIET_ZONE_MODULES) * BARCODE_MODULE_PX;
        for x in x0..x0 + BARCODE_MODULE_PX {
            for y in 0..BARCODE_HEIGHT_PX {
                img.put_pixel(x, y, Luma([0u8]));
            }
        }
    }

    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_printable_ascii() {
        validate("ABC-123 $./+%").unwrap();
        validate("lower case ~{}").unwrap();
    }

    #[test]
    fn test_validate_rejects_outside_charset() {
        assert!(matches!(validate(""), Err(CodeManagerError::InvalidContent(_))));
        assert!(matches!(validate("café"), Err(CodeManagerError::InvalidContent(_))));
        assert!(matches!(validate("tab\there"), Err(CodeManagerError::InvalidContent(_))));
    }

    #[test]
    fn test_encode_produces_bars() {
        let bars = encode("ABC123").unwrap();
        assert!(!bars.is_empty());
        // Every Code 128 symbol starts with a bar
        assert_eq!(bars[0], 1);
    }

    #[test]
    fn test_render_has_quiet_zone() {
        let img = render("ABC123").unwrap();
        assert_eq!(img.height(), BARCODE_HEIGHT_PX);
        assert_eq!(img.get_pixel(0, 0), &Luma([255u8]));
        let first_bar = BARCODE_QUIET_ZONE_MODULES * BARCODE_MODULE_PX;
        assert_eq!(img.get_pixel(first_bar, BARCODE_HEIGHT_PX / 2), &Luma([0u8]));
    }
}
