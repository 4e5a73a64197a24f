/// Column and row count of a near-square grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub cols: usize,
    pub rows: usize,
}

impl GridShape {
    pub fn cell_count(&self) -> usize {
        self.cols * self.rows
    }
}

/// `cols = round(sqrt(count))`, reduced while the grid would be wider than
/// `max_width`, then `rows = ceil(count / cols)`.
pub fn choose_grid(count: usize, cell_width: f32, max_width: Option<f32>) -> GridShape {
    if count == 0 {
        return GridShape { cols: 0, rows: 0 };
    }
    let mut cols = ((count as f32).sqrt().round() as usize).clamp(1, count);
    if let Some(max_width) = max_width {
        while cols > 1 && cols as f32 * cell_width > max_width {
            cols -= 1;
        }
    }
    GridShape {
        cols,
        rows: count.div_ceil(cols),
    }
}

/// Cell index for each of `count` items filled in order. When `pinned` names
/// an item and a point, the cell whose centre is nearest that point is handed
/// to the item first (lowest index on ties) and the rest keep their order.
pub fn assign_cells(
    count: usize,
    shape: GridShape,
    pinned: Option<(usize, (f32, f32))>,
    cell_center: impl Fn(usize) -> (f32, f32),
) -> Vec<usize> {
    let mut cells = vec![0usize; count];
    let mut taken = vec![false; shape.cell_count()];
    let mut pinned_item = None;

    if let Some((item, (px, py))) = pinned.filter(|(item, _)| *item < count) {
        let mut best = 0usize;
        let mut best_dist = f32::MAX;
        for cell in 0..shape.cell_count() {
            let (cx, cy) = cell_center(cell);
            let dist = (cx - px).powi(2) + (cy - py).powi(2);
            if dist < best_dist {
                best_dist = dist;
                best = cell;
            }
        }
        cells[item] = best;
        taken[best] = true;
        pinned_item = Some(item);
    }

    let mut next = 0usize;
    for (item, slot) in cells.iter_mut().enumerate() {
        if Some(item) == pinned_item {
            continue;
        }
        while taken[next] {
            next += 1;
        }
        *slot = next;
        taken[next] = true;
    }
    cells
}
