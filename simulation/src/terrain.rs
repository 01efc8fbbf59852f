//! Terrain Generator
//!
//! Pure functions of global coordinates. Units never exchange terrain, so
//! every unit must derive the same terrain for the same global cell no
//! matter how the grid was sliced.

use crate::components::{Season, Terrain};

/// Terrain type of the global cell `(gx, gy)`.
pub fn terrain(gx: i32, gy: i32) -> Terrain {
    let hash = (i64::from(gx) * 31 + i64::from(gy) * 7) % 5;
    match hash.unsigned_abs() {
        0 => Terrain::Village,
        1 => Terrain::Fishing,
        2 => Terrain::Gathering,
        3 => Terrain::Farmland,
        _ => Terrain::Restricted,
    }
}

/// Maximum resource a cell of this terrain may hold.
pub fn ceiling(terrain: Terrain) -> f64 {
    match terrain {
        Terrain::Village => 100.0,
        Terrain::Fishing => 50.0,
        Terrain::Gathering => 30.0,
        Terrain::Farmland => 80.0,
        Terrain::Restricted => 0.0,
    }
}

/// Fishing grounds dry out in the dry season; restricted land is never open.
pub fn accessible(terrain: Terrain, season: Season) -> bool {
    match terrain {
        Terrain::Restricted => false,
        Terrain::Fishing => season != Season::Dry,
        _ => true,
    }
}

/// Villages and restricted land keep whatever level initialization gave them.
pub fn regenerates(terrain: Terrain) -> bool {
    !matches!(terrain, Terrain::Village | Terrain::Restricted)
}
