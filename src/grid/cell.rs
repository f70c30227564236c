/// Occupancy state of one grid cell.
///
/// The anchor cell of a widget carries its shape tag; the rest of a
/// rectangle's footprint is `Occupied`, while a big square repeats its own
/// tag across the footprint. Only the widget list leaves the server, so the
/// distinction is internal to generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Occupied,
    Square,
    VerticalRectangle,
    HorizontalRectangle,
    BigSquare,
}

impl Cell {
    /// True for the anchor tags, false for `Empty`/`Occupied`.
    pub fn is_shape(&self) -> bool {
        !matches!(self, Cell::Empty | Cell::Occupied)
    }
}
