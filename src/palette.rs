//! The fixed 32-color palette every placement is expressed in.

/// Index into [`PALETTE`]. Always `< PALETTE_SIZE` once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaletteIndex(u8);

pub const PALETTE_SIZE: usize = 32;

/// Colors in index order. The position of a color is its index.
pub const PALETTE: [&str; PALETTE_SIZE] = [
    "#6D001A", "#BE0039", "#FF4500", "#FFA800", "#FFD635", "#FFF8B8", "#00A368", "#00CC78",
    "#7EED56", "#00756F", "#009EAA", "#00CCC0", "#2450A4", "#3690EA", "#51E9F4", "#493AC1",
    "#6A5CFF", "#94B3FF", "#811E9F", "#B44AC0", "#E4ABFF", "#DE107F", "#FF3881", "#FF99AA",
    "#6D482F", "#9C6926", "#FFB470", "#000000", "#515252", "#898D90", "#D4D7D9", "#FFFFFF",
];

/// [`PALETTE`] packed as `0xRRGGBB`, same order.
const PALETTE_RGB: [u32; PALETTE_SIZE] = [
    0x6D001A, 0xBE0039, 0xFF4500, 0xFFA800, 0xFFD635, 0xFFF8B8, 0x00A368, 0x00CC78,
    0x7EED56, 0x00756F, 0x009EAA, 0x00CCC0, 0x2450A4, 0x3690EA, 0x51E9F4, 0x493AC1,
    0x6A5CFF, 0x94B3FF, 0x811E9F, 0xB44AC0, 0xE4ABFF, 0xDE107F, 0xFF3881, 0xFF99AA,
    0x6D482F, 0x9C6926, 0xFFB470, 0x000000, 0x515252, 0x898D90, 0xD4D7D9, 0xFFFFFF,
];

impl PaletteIndex {
    pub fn new(index: u8) -> Option<Self> {
        if (index as usize) < PALETTE_SIZE {
            Some(Self(index))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn hex(self) -> &'static str {
        PALETTE[self.0 as usize]
    }
}

/// Exact lookup of an uppercase `#RRGGBB` string. No nearest-color fallback.
pub fn lookup(hex: &str) -> Option<PaletteIndex> {
    let digits = hex.strip_prefix('#')?;
    let uppercase_hex = digits
        .bytes()
        .all(|c| c.is_ascii_digit() || (b'A'..=b'F').contains(&c));
    if digits.len() != 6 || !uppercase_hex {
        return None;
    }
    let [_, r, g, b] = u32::from_str_radix(digits, 16).ok()?.to_be_bytes();
    lookup_rgb(r, g, b)
}

/// Runs once per opaque pixel of an upload, so it never allocates.
pub fn lookup_rgb(r: u8, g: u8, b: u8) -> Option<PaletteIndex> {
    let packed = u32::from_be_bytes([0, r, g, b]);
    PALETTE_RGB
        .iter()
        .position(|entry| *entry == packed)
        .map(|i| PaletteIndex(i as u8))
}

pub fn contains(index: i64) -> bool {
    (0..PALETTE_SIZE as i64).contains(&index)
}

pub fn rgb_to_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}
