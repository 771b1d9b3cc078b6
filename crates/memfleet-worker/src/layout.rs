//! Grid placement of worker windows.
//!
//! Workers are laid out row-major: with `cols = count / rows`, worker `i`
//! sits in row `i / cols`, column `i % cols`.

use memfleet_core::{FleetError, LayoutSettings, Location, Result, WindowSize};

/// Screen positions for every active worker, indexed like the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    pub rows: usize,
    pub columns: usize,
    pub locations: Vec<Location>,
}

impl LayoutPlan {
    pub fn location(&self, index: usize) -> Option<Location> {
        self.locations.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// Compute window positions for `active_count` workers.
pub fn plan(
    active_count: usize,
    settings: &LayoutSettings,
    window: WindowSize,
) -> Result<LayoutPlan> {
    let rows = settings.rows;
    if rows == 0 || active_count % rows != 0 {
        return Err(FleetError::invalid_layout(active_count, rows));
    }

    let columns = active_count / rows;
    let step_x = window.width as i32 + settings.x_spacing;
    let step_y = window.height as i32 + settings.y_spacing;

    let locations = (0..active_count)
        .map(|i| {
            let row = (i / columns) as i32;
            let col = (i % columns) as i32;
            Location::new(col * step_x + settings.x_offset, row * step_y + settings.y_offset)
        })
        .collect();

    Ok(LayoutPlan {
        rows,
        columns,
        locations,
    })
}

/// Offsets that centre a `rows`-row grid of `threads` windows in a work area.
///
/// Offsets go negative when the grid is larger than the work area.
pub fn centre_offsets(
    rows: usize,
    threads: usize,
    work_area: WindowSize,
    window: WindowSize,
) -> Result<(i32, i32)> {
    if rows == 0 || threads % rows != 0 {
        return Err(FleetError::invalid_layout(threads, rows));
    }

    let columns = (threads / rows) as i64;
    let x = (work_area.width as i64 - window.width as i64 * columns) / 2;
    let y = (work_area.height as i64 - window.height as i64 * rows as i64) / 2;

    Ok((x as i32, y as i32))
}

/// `settings` with its offsets replaced by the centred ones.
pub fn centred(
    settings: &LayoutSettings,
    threads: usize,
    work_area: WindowSize,
    window: WindowSize,
) -> Result<LayoutSettings> {
    let (x_offset, y_offset) = centre_offsets(settings.rows, threads, work_area, window)?;
    Ok(LayoutSettings {
        x_offset,
        y_offset,
        ..*settings
    })
}
