pub const COLOR_PALETTE: [&str; 12] = [
    "#E57373", // red
    "#81C784", // green
    "#64B5F6", // blue
    "#FFB74D", // orange
    "#BA68C8", // purple
    "#4DB6AC", // teal
    "#F06292", // pink
    "#AED581", // light green
    "#7986CB", // indigo
    "#FFD54F", // amber
    "#4DD0E1", // cyan
    "#A1887F", // brown
];

/// Stable color for a writer: `hash * 31 + unit` over UTF-16 code units in
/// wrapping 32-bit arithmetic, indexed by its absolute value.
pub fn color_for_username(username: &str) -> &'static str {
    let hash = username
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(i32::from(unit))
        });
    let index = i64::from(hash).unsigned_abs() % COLOR_PALETTE.len() as u64;
    COLOR_PALETTE[index as usize]
}

/// Parses `#RRGGBB` into its components.
pub fn rgb(color: &str) -> Option<(u8, u8, u8)> {
    let bytes = hex::decode(color.strip_prefix('#')?).ok()?;
    match bytes.as_slice() {
        [r, g, b] => Some((*r, *g, *b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_map_to_expected_colors() {
        assert_eq!(color_for_username(""), "#E57373");
        // 97 % 12 == 1
        assert_eq!(color_for_username("a"), "#81C784");
        // 97 * 31 + 98 == 3105, 3105 % 12 == 9
        assert_eq!(color_for_username("ab"), "#FFD54F");
    }

    #[test]
    fn long_names_wrap_without_panicking() {
        let name = "a-very-long-username-that-overflows-thirty-two-bits".repeat(4);
        assert_eq!(color_for_username(&name), color_for_username(&name));
    }

    #[test]
    fn parses_palette_entries() {
        assert_eq!(rgb("#E57373"), Some((0xE5, 0x73, 0x73)));
        assert_eq!(rgb("E57373"), None);
        assert_eq!(rgb("#XYZ"), None);
        assert!(COLOR_PALETTE.iter().all(|color| rgb(color).is_some()));
    }
}
