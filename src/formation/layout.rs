//! Formation grid layout
//!
//! Converts a flat list of units into per-unit offsets in the formation's
//! local frame (+x forward, +y right). Units fill rows of at most
//! `max_row_width`, row-major, each row centered on the movement axis and
//! placed behind the previous one. Spacing derives from the units' physical
//! radii so mixed vehicle/squad formations don't overlap.

use glam::Vec2;

/// Offsets for `radii.len()` units, in input order.
///
/// `offset_scale` stretches the whole grid; values below 1 are clamped up so
/// a misconfigured wave can never stack units inside each other.
pub fn grid_offsets(radii: &[f32], max_row_width: u32, offset_scale: f32) -> Vec<Vec2> {
    let width = max_row_width.max(1) as usize;
    let scale = offset_scale.max(1.0);
    let mut offsets = Vec::with_capacity(radii.len());

    let mut row_start = 0;
    let mut back_offset = 0.0f32;
    let mut prev_row_max_radius = 0.0f32;

    while row_start < radii.len() {
        let row = &radii[row_start..(row_start + width).min(radii.len())];
        let row_max_radius = row.iter().fold(0.0f32, |acc, r| acc.max(*r));

        // Rows sit behind each other far enough apart for the largest unit
        // of each row.
        if row_start > 0 {
            back_offset += prev_row_max_radius + row_max_radius;
        }

        // Lateral positions: each unit keeps touching-circle distance to its
        // left neighbor, then the whole row is shifted so it is centered.
        let mut lateral = Vec::with_capacity(row.len());
        let mut cursor = 0.0f32;
        for (column, radius) in row.iter().enumerate() {
            if column > 0 {
                cursor += row[column - 1] + radius;
            }
            lateral.push(cursor);
        }
        let row_span = lateral.last().copied().unwrap_or(0.0);
        let centering = row_span / 2.0;

        for position in &lateral {
            offsets.push(Vec2::new(-back_offset, position - centering) * scale);
        }

        prev_row_max_radius = row_max_radius;
        row_start += width;
    }

    offsets
}
