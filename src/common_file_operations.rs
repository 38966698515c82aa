// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use encoding_rs::WINDOWS_1252;

/// Encodes `string` in the Windows-1252 codepage, or `None` if any character has no mapping.
pub(crate) fn encode_windows_1252(string: &str) -> Option<Vec<u8>> {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(string);
    if had_errors {
        None
    } else {
        Some(bytes.into_owned())
    }
}

pub(crate) fn decode_windows_1252(bytes: &[u8]) -> String {
    let (string, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    string.into_owned()
}

/// Reads a section tag, trimming the nul padding.
pub(crate) fn read_tag(bytes: [u8; 20]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

pub(crate) fn write_tag(tag: &str) -> [u8; 20] {
    let mut buffer = [0u8; 20];
    let bytes = tag.as_bytes();
    let len = bytes.len().min(buffer.len());
    buffer[..len].copy_from_slice(&bytes[..len]);
    buffer
}

/// The sRGB transfer function, applied to one linear channel.
pub(crate) fn rgb_to_srgb(c: f32) -> f32 {
    if c > 0.0031308 {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    } else {
        12.92 * c
    }
}

/// The inverse of [`rgb_to_srgb`].
pub(crate) fn srgb_to_rgb(c: f32) -> f32 {
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // "FOO\0"
    const TAG_DATA: [u8; 4] = [0x46u8, 0x4Fu8, 0x4Fu8, 0x0u8];

    #[test]
    fn read_tag() {
        let mut bytes = [0u8; 20];
        bytes[..4].copy_from_slice(&TAG_DATA);
        // The nul padding is supposed to be removed
        assert_eq!(
            crate::common_file_operations::read_tag(bytes),
            "FOO".to_string()
        );
    }

    #[test]
    fn write_tag() {
        let bytes = crate::common_file_operations::write_tag("FOO");
        assert_eq!(&bytes[..4], &TAG_DATA);
        assert!(bytes[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn windows_1252() {
        assert_eq!(encode_windows_1252("€"), Some(vec![0x80]));
        assert_eq!(decode_windows_1252(&[0x80]), "€");
        assert_eq!(encode_windows_1252("スケルトン"), None);
    }

    #[test]
    fn srgb_transfer() {
        assert_eq!(rgb_to_srgb(0.0), 0.0);
        assert!((rgb_to_srgb(1.0) - 1.0).abs() < 1e-6);
        assert!((rgb_to_srgb(0.001) - 0.01292).abs() < 1e-7);
        assert!((rgb_to_srgb(0.5) - 0.735_356_7).abs() < 1e-5);
        assert!((srgb_to_rgb(rgb_to_srgb(0.5)) - 0.5).abs() < 1e-5);
        assert!((srgb_to_rgb(0.01292) - 0.001).abs() < 1e-7);
    }
}
