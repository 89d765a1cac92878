//! Expansion of primitive topologies into triangle lists.

/// Convert a triangle strip to a triangle list.
///
/// Adjacent triangles share two vertices; winding alternates so every
/// emitted triangle keeps the strip's facing. Degenerate triangles (with a
/// repeated vertex, used as strip restarts) are skipped.
#[must_use]
pub fn strip_to_triangles(strip: &[u32]) -> Vec<u32> {
    if strip.len() < 3 {
        return Vec::new();
    }

    let mut triangles = Vec::with_capacity((strip.len() - 2) * 3);

    for (i, window) in strip.windows(3).enumerate() {
        let (a, b, c) = (window[0], window[1], window[2]);

        if a == b || a == c || b == c {
            continue;
        }

        if i % 2 == 0 {
            triangles.extend_from_slice(&[a, b, c]);
        } else {
            triangles.extend_from_slice(&[a, c, b]);
        }
    }

    triangles
}

/// Convert a triangle fan to a triangle list.
///
/// Every triangle shares the first vertex.
#[must_use]
pub fn fan_to_triangles(fan: &[u32]) -> Vec<u32> {
    let Some((&hub, rest)) = fan.split_first() else {
        return Vec::new();
    };

    rest.windows(2)
        .flat_map(|pair| [hub, pair[0], pair[1]])
        .collect()
}
