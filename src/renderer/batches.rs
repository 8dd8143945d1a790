use glam::Vec3;

use crate::asset::Handle;
use crate::renderer::mesh::Mesh;
use crate::renderer::renderable::Renderable;

/// Non-animated renderables sharing one mesh, drawn with a single
/// instanced call. Members are indices into the frame's renderables.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceBatch {
    pub mesh: Handle<Mesh>,
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedBatches {
    /// Drawn individually, farthest first.
    pub singles: Vec<usize>,
    pub instanced: Vec<InstanceBatch>,
}

impl SortedBatches {
    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.instanced.is_empty()
    }
}

/// Groups visible renderables into instance batches and back-to-front
/// singles.
pub fn sort(renderables: &[Renderable], visible: &[usize], camera_position: Vec3) -> SortedBatches {
    let mut by_mesh = visible.to_vec();
    by_mesh.sort_by_key(|&index| renderables[index].mesh.index());

    let mut sorted = SortedBatches::default();
    let mut cursor = 0;
    while cursor < by_mesh.len() {
        let mesh = renderables[by_mesh[cursor]].mesh;
        let run_end = cursor
            + by_mesh[cursor..]
                .iter()
                .take_while(|&&index| renderables[index].mesh == mesh)
                .count();

        let (animated, members): (Vec<usize>, Vec<usize>) = by_mesh[cursor..run_end]
            .iter()
            .partition(|&&index| renderables[index].animated);
        sorted.singles.extend(animated);

        if members.len() >= 2 {
            sorted.instanced.push(InstanceBatch { mesh, members });
        } else {
            sorted.singles.extend(members);
        }
        cursor = run_end;
    }

    sort_back_to_front(&mut sorted.singles, renderables, camera_position);
    sorted
}

fn sort_back_to_front(indices: &mut [usize], renderables: &[Renderable], camera_position: Vec3) {
    // `sort_by` is stable, so equal distances keep their relative order.
    indices.sort_by(|&a, &b| {
        let da = renderables[a].translation().distance_squared(camera_position);
        let db = renderables[b].translation().distance_squared(camera_position);
        db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
    });
}
