use serde::{Deserialize, Serialize};

/// Color representation.
///
/// Serializes to and from CSS hex strings (`#RRGGBB` or `#RRGGBBAA`).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from_hex(&value).ok_or_else(|| format!("invalid color `{value}`"))
    }
}

impl From<Color> for String {
    fn from(val: Color) -> Self {
        val.to_css()
    }
}

impl From<Color> for serde_json::Value {
    fn from(val: Color) -> Self {
        serde_json::Value::String(val.to_css())
    }
}

impl Color {
    /// Transparent color: `#00000000`
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    /// White color: `#FFFFFFFF`
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    /// Black color: `#000000FF`
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);

    /// Constructs color from its RGBA channels.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Converts the color into u8 array (RGBA).
    pub fn to_u8_array(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Converts the color into HEX8 string: `#RRGGBBAA`.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }

    /// CSS representation: `#rrggbb` for opaque colors, `#rrggbbaa` otherwise.
    pub fn to_css(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!(
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r, self.g, self.b, self.a
            )
        }
    }

    /// Parses a color from the hex string. Hex string can be HEX3 (`#RGB`), HEX6 (`#RRGGBB`) or
    /// HEX8 (`#RRGGBBAA`).
    pub fn try_from_hex(hex_string: &str) -> Option<Self> {
        let digits = hex_string.strip_prefix('#')?;
        if !digits.is_ascii() {
            return None;
        }

        match digits.len() {
            3 => {
                let channel = |i: usize| {
                    u8::from_str_radix(&digits[i..i + 1], 16)
                        .ok()
                        .map(|v| v * 17)
                };
                Some(Self::rgba(channel(0)?, channel(1)?, channel(2)?, 255))
            }
            6 | 8 => {
                let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
                let a = if digits.len() == 8 { channel(6)? } else { 255 };
                Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, a))
            }
            _ => None,
        }
    }

    /// Parses a color from the hex string. Hex string can be either HEX6 (`#RRGGBB`) or HEX8
    /// (`#RRGGBBAA`).
    ///
    /// # Panics
    ///
    /// Panics if the parsing fails.
    pub const fn from_hex(hex_string: &'static str) -> Self {
        let bytes = hex_string.as_bytes();
        if bytes.len() != 7 && bytes.len() != 9 || bytes[0] != b'#' {
            panic!("Invalid color hex string");
        }

        let r = decode_byte(&[bytes[1], bytes[2]]);
        let g = decode_byte(&[bytes[3], bytes[4]]);
        let b = decode_byte(&[bytes[5], bytes[6]]);
        let a = if hex_string.len() == 9 {
            decode_byte(&[bytes[7], bytes[8]])
        } else {
            255
        };

        Self { r, g, b, a }
    }

    /// Returns a new color instance, copied from the base one but with the given alpha channel.
    pub fn with_alpha(&self, a: u8) -> Self {
        Self { a, ..*self }
    }

    /// Red component of the color in RGBA space.
    pub fn r(&self) -> u8 {
        self.r
    }

    /// Green component of the color in RGBA space.
    pub fn g(&self) -> u8 {
        self.g
    }

    /// Blue component of the color in RGBA space.
    pub fn b(&self) -> u8 {
        self.b
    }

    /// Opacity component of the color.
    pub fn a(&self) -> u8 {
        self.a
    }
}

const fn decode_byte(chars: &[u8]) -> u8 {
    debug_assert!(chars.len() == 2);
    let first = decode_char(chars[0]);
    let second = decode_char(chars[1]);

    first * 16 + second
}

const fn decode_char(byte: u8) -> u8 {
    match byte {
        b'0'..=b'9' => byte - b'0',
        b'a'..=b'f' => byte - b'a' + 10,
        b'A'..=b'F' => byte - b'A' + 10,
        _ => panic!("Invalid hex character"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_css_forms() {
        assert_eq!(Color::try_from_hex("#666"), Some(Color::rgba(102, 102, 102, 255)));
        assert_eq!(
            Color::try_from_hex("#537A5A"),
            Some(Color::from_hex("#537a5a"))
        );
        assert_eq!(Color::try_from_hex("#FF1000AA").map(|c| c.a()), Some(0xAA));
        assert_eq!(Color::try_from_hex("537A5A"), None);
        assert_eq!(Color::try_from_hex("#53"), None);
    }

    #[test]
    fn css_output() {
        assert_eq!(Color::from_hex("#F2C94C").to_css(), "#f2c94c");
        assert_eq!(Color::WHITE.to_css(), "#ffffff");
        assert_eq!(Color::WHITE.with_alpha(0x80).to_css(), "#ffffff80");
        assert_eq!(Color::WHITE.to_hex(), "#FFFFFFFF");
    }

    #[test]
    fn color_serialization() {
        let json = serde_json::to_string(&Color::from_hex("#51bbd6")).unwrap();
        assert_eq!(json, "\"#51bbd6\"");
        let parsed: Color = serde_json::from_str("\"#f28cb1\"").unwrap();
        assert_eq!(parsed, Color::from_hex("#f28cb1"));
        assert!(serde_json::from_str::<Color>("\"red\"").is_err());
    }
}
