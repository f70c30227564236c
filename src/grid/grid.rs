use super::Cell;
use super::Kind;
use super::Widget;
use crate::Role;
use crate::names::NameSource;
use rand::Rng;
use rand::seq::IndexedRandom;

/// Which widget family to build for a placed shape.
#[derive(Clone, Copy, Debug)]
enum Pick {
    Button,
    Switch,
    Slider,
    Circular,
    Buttons,
    Actions,
}

/// A player's widget layout: a rectangular occupancy map plus the ordered
/// widgets stamped onto it. Built once per level by [`Grid::generate`];
/// pure with respect to I/O and timers.
#[derive(Clone, Debug)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    widgets: Vec<Widget>,
}

impl Grid {
    /// Fills a `width×height` board by scanning cells in row-major order and
    /// dropping a randomly shaped, randomly typed widget onto every cell that
    /// is still empty. Stops early (partial grid, no error) once the name
    /// source runs dry.
    pub fn generate<R: Rng>(
        width: usize,
        height: usize,
        role: Role,
        level: i32,
        names: &mut dyn NameSource,
        rng: &mut R,
    ) -> Self {
        let mut grid = Self {
            width,
            height,
            cells: vec![Cell::Empty; width * height],
            widgets: Vec::new(),
        };
        log::debug!("[grid] generating {}x{} grid for role {}", width, height, role);
        'scan: for y in 0..height {
            for x in 0..width {
                if grid.cell(y, x) != Cell::Empty {
                    continue;
                }
                if !grid.place(y, x, role, level, names, rng) {
                    log::warn!("[grid] name source exhausted, stopping placement");
                    break 'scan;
                }
            }
        }
        grid
    }

    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn cell(&self, y: usize, x: usize) -> Cell {
        self.cells[y * self.width + x]
    }
    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }
    pub fn widget(&self, name: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.name == name)
    }
    pub fn widget_mut(&mut self, name: &str) -> Option<&mut Widget> {
        self.widgets.iter_mut().find(|w| w.name == name)
    }
    /// Swaps out the widget at `index`, keeping list order.
    pub fn replace(&mut self, index: usize, widget: Widget) {
        self.widgets[index] = widget;
    }

    /// Wire format: a bare array of widget payloads.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::Value::Array(self.widgets.iter().map(|w| w.payload()).collect())
    }

    /// Places one widget anchored at `(y,x)`. Returns false when the name
    /// source is exhausted and nothing was placed.
    fn place<R: Rng>(
        &mut self,
        y: usize,
        x: usize,
        role: Role,
        level: i32,
        names: &mut dyn NameSource,
        rng: &mut R,
    ) -> bool {
        let right = self.spaces_right(y, x);
        let down = self.spaces_down(y, x);

        let mut shapes = vec![Cell::Square];
        if right > 0 {
            shapes.push(Cell::HorizontalRectangle);
        }
        if down > 0 {
            shapes.push(Cell::VerticalRectangle);
        }
        if right > 0 && down > 0 {
            shapes.push(Cell::BigSquare);
        }
        let shape = *shapes.choose(rng).expect("shape pool is never empty");

        // Sizes are capped by the contiguous empty run so footprints never
        // collide with widgets placed on earlier rows.
        let size = match shape {
            Cell::Square => 1,
            Cell::HorizontalRectangle => Self::span(level, self.width - 1 - x, right, rng),
            Cell::VerticalRectangle => Self::span(level, self.height - 1 - y, down, rng),
            Cell::BigSquare => {
                let edge = (self.width - 1 - x).min(self.height - 1 - y);
                Self::span(level, edge.min(3), right.min(down), rng)
            }
            _ => unreachable!("only shape tags are drawn"),
        };
        self.stamp(y, x, shape, size);

        let mut pool = Vec::new();
        match shape {
            Cell::Square => pool.extend([Pick::Button, Pick::Switch]),
            Cell::BigSquare => pool.extend([
                Pick::Button,
                Pick::Switch,
                Pick::Circular,
                Pick::Circular,
                Pick::Circular,
            ]),
            Cell::VerticalRectangle => {
                if size == 2 {
                    pool.extend([Pick::Actions, Pick::Actions]);
                }
                pool.push(Pick::Slider);
            }
            Cell::HorizontalRectangle => {
                pool.extend([Pick::Slider, Pick::Buttons, Pick::Buttons]);
            }
            _ => unreachable!("only shape tags are drawn"),
        }
        let pick = *pool.choose(rng).expect("widget pool is never empty");

        let kind = match pick {
            Pick::Button => Kind::Button,
            Pick::Switch => Kind::Switch { toggled: false },
            Pick::Slider => Kind::Slider {
                min: 0,
                max: rng.random_range(3..=5),
                value: 0,
            },
            Pick::Buttons => Kind::ButtonsSlider {
                min: 0,
                max: rng.random_range(3..=5),
                value: 0,
            },
            Pick::Circular => Kind::CircularSlider {
                min: 0,
                max: rng.random_range(4..=7),
                value: 0,
            },
            Pick::Actions => Kind::Actions {
                actions: (0..rng.random_range(2..=4))
                    .map(|_| names.action_name())
                    .collect(),
            },
        };
        let (w, h) = match shape {
            Cell::Square => (1, 1),
            Cell::HorizontalRectangle => (size, 1),
            Cell::VerticalRectangle => (1, size),
            Cell::BigSquare => (size, size),
            _ => unreachable!("only shape tags are drawn"),
        };
        match names.command_name(role) {
            Some(name) => {
                self.widgets.push(Widget::new(name, x, y, w, h, kind));
                true
            }
            None => false,
        }
    }

    /// Rectangle span: always 2 on the intro level, otherwise uniform in
    /// `[2, edge]` further capped by the empty run past the anchor.
    fn span<R: Rng>(level: i32, edge: usize, run: usize, rng: &mut R) -> usize {
        if level == 0 {
            return 2;
        }
        let hi = edge.min(run + 1).max(2);
        rng.random_range(2..=hi)
    }

    fn stamp(&mut self, y: usize, x: usize, shape: Cell, size: usize) {
        self.set(y, x, shape);
        match shape {
            Cell::VerticalRectangle => {
                for i in y + 1..y + size {
                    self.set(i, x, Cell::Occupied);
                }
            }
            Cell::HorizontalRectangle => {
                for i in x + 1..x + size {
                    self.set(y, i, Cell::Occupied);
                }
            }
            Cell::BigSquare => {
                self.set(y + 1, x, Cell::BigSquare);
                self.set(y, x + 1, Cell::BigSquare);
                self.set(y + 1, x + 1, Cell::BigSquare);
                if size == 3 {
                    for i in 0..3 {
                        self.set(y + 2, x + i, Cell::BigSquare);
                        self.set(y + i, x + 2, Cell::BigSquare);
                    }
                }
            }
            _ => {}
        }
    }

    fn set(&mut self, y: usize, x: usize, cell: Cell) {
        self.cells[y * self.width + x] = cell;
    }

    /// Contiguous empty cells to the right of `(y,x)`, not counting it.
    fn spaces_right(&self, y: usize, x: usize) -> usize {
        (x + 1..self.width)
            .take_while(|i| self.cell(y, *i) == Cell::Empty)
            .count()
    }
    /// Contiguous empty cells below `(y,x)`, not counting it.
    fn spaces_down(&self, y: usize, x: usize) -> usize {
        (y + 1..self.height)
            .take_while(|i| self.cell(*i, x) == Cell::Empty)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    /// Sequential names, optionally capped to simulate exhaustion.
    struct Stub {
        n: usize,
        a: usize,
        cap: Option<usize>,
    }
    impl Stub {
        fn unlimited() -> Self {
            Self { n: 0, a: 0, cap: None }
        }
        fn capped(cap: usize) -> Self {
            Self { n: 0, a: 0, cap: Some(cap) }
        }
    }
    impl NameSource for Stub {
        fn command_name(&mut self, role: Role) -> Option<String> {
            if self.cap.is_some_and(|cap| self.n >= cap) {
                return None;
            }
            self.n += 1;
            Some(format!("cmd-{}-{}", role, self.n))
        }
        fn action_name(&mut self) -> String {
            self.a += 1;
            format!("act-{}", self.a)
        }
    }

    fn boxes_disjoint(a: &Widget, b: &Widget) -> bool {
        a.x + a.w <= b.x || b.x + b.w <= a.x || a.y + a.h <= b.y || b.y + b.h <= a.y
    }

    #[test]
    fn widgets_stay_in_bounds_and_disjoint() {
        for seed in 0..64 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let grid = Grid::generate(4, 4, 0, 3, &mut Stub::unlimited(), &mut rng);
            for w in grid.widgets() {
                assert!(w.x + w.w <= grid.width(), "seed {}", seed);
                assert!(w.y + w.h <= grid.height(), "seed {}", seed);
            }
            for (i, a) in grid.widgets().iter().enumerate() {
                for b in grid.widgets().iter().skip(i + 1) {
                    assert!(boxes_disjoint(a, b), "seed {}: {:?} vs {:?}", seed, a, b);
                }
            }
        }
    }

    #[test]
    fn every_cell_is_covered() {
        for seed in 0..64 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let grid = Grid::generate(4, 4, 1, 2, &mut Stub::unlimited(), &mut rng);
            for y in 0..4 {
                for x in 0..4 {
                    assert_ne!(grid.cell(y, x), Cell::Empty, "seed {}", seed);
                    let covering = grid
                        .widgets()
                        .iter()
                        .filter(|w| w.x <= x && x < w.x + w.w && w.y <= y && y < w.y + w.h)
                        .count();
                    assert_eq!(covering, 1, "seed {} cell ({},{})", seed, y, x);
                }
            }
        }
    }

    #[test]
    fn anchors_carry_shape_tags() {
        let mut rng = SmallRng::seed_from_u64(11);
        let grid = Grid::generate(4, 4, 0, 1, &mut Stub::unlimited(), &mut rng);
        for w in grid.widgets() {
            assert!(grid.cell(w.y, w.x).is_shape(), "{:?}", w);
        }
    }

    #[test]
    fn names_are_unique() {
        let mut rng = SmallRng::seed_from_u64(3);
        let grid = Grid::generate(4, 4, 2, 4, &mut Stub::unlimited(), &mut rng);
        let mut names: Vec<_> = grid.widgets().iter().map(|w| w.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), grid.widgets().len());
    }

    #[test]
    fn exhausted_names_stop_generation() {
        let mut rng = SmallRng::seed_from_u64(5);
        let grid = Grid::generate(4, 4, 0, 0, &mut Stub::capped(2), &mut rng);
        assert_eq!(grid.widgets().len(), 2);
    }

    #[test]
    fn intro_level_caps_spans_at_two() {
        for seed in 0..32 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let grid = Grid::generate(4, 4, 0, 0, &mut Stub::unlimited(), &mut rng);
            for w in grid.widgets() {
                assert!(w.w <= 2 && w.h <= 2, "seed {}: {:?}", seed, w);
            }
        }
    }

    #[test]
    fn slider_ranges_follow_their_family() {
        for seed in 0..32 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let grid = Grid::generate(4, 4, 0, 3, &mut Stub::unlimited(), &mut rng);
            for w in grid.widgets() {
                match &w.kind {
                    Kind::Slider { min, max, .. } | Kind::ButtonsSlider { min, max, .. } => {
                        assert_eq!(*min, 0);
                        assert!((3..=5).contains(max));
                    }
                    Kind::CircularSlider { min, max, .. } => {
                        assert_eq!(*min, 0);
                        assert!((4..=7).contains(max));
                    }
                    Kind::Actions { actions } => {
                        assert!((2..=4).contains(&actions.len()));
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn payload_is_a_bare_array() {
        let mut rng = SmallRng::seed_from_u64(9);
        let grid = Grid::generate(2, 2, 0, 0, &mut Stub::unlimited(), &mut rng);
        let payload = grid.payload();
        let list = payload.as_array().expect("array payload");
        assert_eq!(list.len(), grid.widgets().len());
        assert!(list.iter().all(|w| w.get("name").is_some()));
    }
}
