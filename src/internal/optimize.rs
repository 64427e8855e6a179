use super::SubMesh;
use crate::math::EPSILON;

/// Simulated post-transform cache size.
pub const CACHE_SIZE: usize = 16;

const LAST_TRIANGLE_SCORE: f32 = 0.75;
const CACHE_DECAY_POWER: f32 = 1.5;
const VALENCE_BOOST_SCALE: f32 = 2.0;
const VALENCE_BOOST_POWER: f32 = -0.5;

// ─── Degenerate triangles ─────────────────────────────────────────────────────

/// Remove triangles whose edge cross product is shorter than `EPSILON`.
/// Returns the number of triangles removed.
pub fn remove_degenerate_triangles(mesh: &mut SubMesh) -> usize {
    let before = mesh.triangle_count();
    let mut kept = Vec::with_capacity(mesh.indices.len());
    for t in 0..before {
        let [a, b, c] = mesh.triangle(t);
        let (pa, pb, pc) = (mesh.positions[a], mesh.positions[b], mesh.positions[c]);
        if (pb - pa).cross(&(pc - pa)).norm() >= EPSILON {
            kept.extend_from_slice(&mesh.indices[t * 3..t * 3 + 3]);
        }
    }
    mesh.indices = kept;
    before - mesh.triangle_count()
}

// ─── Forsyth vertex cache optimization ────────────────────────────────────────

/// Score of a vertex given its position in the simulated cache and the
/// number of faces still using it.
fn vertex_score(cache_position: Option<usize>, live_faces: usize) -> f32 {
    if live_faces == 0 {
        return 0.0;
    }
    let cache_score = match cache_position {
        None => 0.0,
        Some(p) if p < 3 => LAST_TRIANGLE_SCORE,
        Some(p) if p < CACHE_SIZE => {
            (1.0 - (p as f32 - 3.0) / CACHE_SIZE as f32).powf(CACHE_DECAY_POWER)
        }
        Some(_) => 0.0,
    };
    cache_score + VALENCE_BOOST_SCALE * (live_faces as f32).powf(VALENCE_BOOST_POWER)
}

#[derive(Debug, Default)]
struct OptVertex {
    score: f32,
    /// Faces not yet emitted that use this vertex.
    faces: Vec<usize>,
}

/// Reorder `mesh.indices` for post-transform cache reuse.
///
/// Greedy: pick the best face among those touching cached vertices, falling
/// back to a scan of all remaining faces. The new order is kept only when it
/// does not measure worse than the input order, so an input that is already
/// cache friendly is never made worse by the greedy pass. The ATVR after this
/// call is at most the ATVR before it. Vertex data is untouched.
pub fn optimize_index_order(mesh: &mut SubMesh) {
    if mesh.indices.is_empty() {
        return;
    }
    let reordered = forsyth_order(mesh);
    let before = transform_ratio(&mesh.indices);
    let after = transform_ratio(&reordered);
    log::debug!("submesh '{}': cache ratio {before:.3} -> {after:.3}", mesh.name);
    if after <= before {
        mesh.indices = reordered;
    }
}

fn forsyth_order(mesh: &SubMesh) -> Vec<u32> {
    let face_count = mesh.triangle_count();
    let faces: Vec<[usize; 3]> = (0..face_count).map(|t| mesh.triangle(t)).collect();

    let mut verts: Vec<OptVertex> = (0..mesh.vertex_count()).map(|_| OptVertex::default()).collect();
    for (f, face) in faces.iter().enumerate() {
        for &v in face {
            if !verts[v].faces.contains(&f) {
                verts[v].faces.push(f);
            }
        }
    }
    for vertex in &mut verts {
        vertex.score = vertex_score(None, vertex.faces.len());
    }

    let face_score = |verts: &[OptVertex], f: usize| -> f32 {
        faces[f].iter().map(|&v| verts[v].score).sum()
    };

    let mut alive = vec![true; face_count];
    let mut cache: Vec<usize> = Vec::with_capacity(CACHE_SIZE + 3);
    let mut order = Vec::with_capacity(mesh.indices.len());

    for _ in 0..face_count {
        let mut best: Option<usize> = None;
        let mut best_score = -1.0f32;
        for &v in &cache {
            for &f in &verts[v].faces {
                let score = face_score(&verts, f);
                if score > best_score {
                    best = Some(f);
                    best_score = score;
                }
            }
        }
        if best.is_none() {
            for f in (0..face_count).filter(|&f| alive[f]) {
                let score = face_score(&verts, f);
                if score > best_score {
                    best = Some(f);
                    best_score = score;
                }
            }
        }
        let Some(best) = best else {
            break;
        };

        for &v in &faces[best] {
            order.push(v as u32);
            if let Some(pos) = cache.iter().position(|&c| c == v) {
                cache.remove(pos);
            }
            cache.insert(0, v);
            verts[v].faces.retain(|&f| f != best);
        }
        alive[best] = false;

        // Evicted vertices fall back to their valence-only score.
        while cache.len() > CACHE_SIZE {
            if let Some(evicted) = cache.pop() {
                verts[evicted].score = vertex_score(None, verts[evicted].faces.len());
            }
        }
        for (pos, &v) in cache.iter().enumerate() {
            verts[v].score = vertex_score(Some(pos), verts[v].faces.len());
        }
    }
    order
}

// ─── Cache efficiency ─────────────────────────────────────────────────────────

/// Number of cache misses when drawing `indices` through an LRU cache of
/// `CACHE_SIZE` entries.
fn cache_misses(indices: &[u32]) -> usize {
    let mut cache: Vec<u32> = Vec::with_capacity(CACHE_SIZE + 1);
    let mut misses = 0;
    for &index in indices {
        match cache.iter().position(|&c| c == index) {
            Some(pos) => {
                cache.remove(pos);
            }
            None => misses += 1,
        }
        cache.insert(0, index);
        cache.truncate(CACHE_SIZE);
    }
    misses
}

fn transform_ratio(indices: &[u32]) -> f32 {
    (indices.len() + cache_misses(indices)) as f32 / indices.len() as f32
}

/// Average transform to vertex ratio over all submeshes with triangles.
///
/// Each submesh contributes `(index_count + misses) / index_count`. Returns
/// 1.0 when no submesh has triangles.
pub fn average_transform_to_vertex_ratio(meshes: &[SubMesh]) -> f32 {
    let ratios: Vec<f32> = meshes
        .iter()
        .filter(|m| !m.indices.is_empty())
        .map(|m| transform_ratio(&m.indices))
        .collect();
    if ratios.is_empty() {
        1.0
    } else {
        ratios.iter().sum::<f32>() / ratios.len() as f32
    }
}
