//! Maze wall map and flood-fill step counts.
//!
//! Cells are addressed by [`Coord`] with the start cell at (0, 0) in the south-west corner and
//! north pointing toward increasing `y`. Every cell stores one [`Walls`] byte: the low nibble
//! says which walls exist, the high nibble which of them have been observed.

use core::fmt;

use bitfield_struct::bitfield;

use crate::parameters::{MAZE_GOAL_SIZE_X, MAZE_GOAL_SIZE_Y, MAZE_GOAL_X, MAZE_GOAL_Y, MAZE_SIZE};
use crate::queue::Queue;

/// Raw wall bytes of the whole maze, indexed `[y][x]`.
pub type WallBytes = [[u8; MAZE_SIZE]; MAZE_SIZE];

/// Step count of cells the flood fill never reached.
pub const STEP_UNREACHED: u16 = u16::MAX;

const CELL_COUNT: usize = MAZE_SIZE * MAZE_SIZE;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    #[default]
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub const fn from_index(index: u8) -> Self {
        match index & 0x03 {
            0 => Direction::North,
            1 => Direction::East,
            2 => Direction::South,
            _ => Direction::West,
        }
    }

    pub const fn right(self) -> Self {
        Self::from_index(self as u8 + 1)
    }

    pub const fn left(self) -> Self {
        Self::from_index(self as u8 + 3)
    }

    pub const fn reverse(self) -> Self {
        Self::from_index(self as u8 + 2)
    }

    const fn mask(self) -> u8 {
        1 << self as u8
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Coord {
    pub x: u8,
    pub y: u8,
}

impl Coord {
    pub const START: Coord = Coord::new(0, 0);

    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Adjacent cell, or `None` past the maze boundary.
    pub fn neighbour(self, direction: Direction) -> Option<Coord> {
        let (x, y) = (usize::from(self.x), usize::from(self.y));
        match direction {
            Direction::North if y + 1 < MAZE_SIZE => Some(Coord::new(self.x, self.y + 1)),
            Direction::East if x + 1 < MAZE_SIZE => Some(Coord::new(self.x + 1, self.y)),
            Direction::South if y > 0 => Some(Coord::new(self.x, self.y - 1)),
            Direction::West if x > 0 => Some(Coord::new(self.x - 1, self.y)),
            _ => None,
        }
    }

    fn is_boundary(self, direction: Direction) -> bool {
        self.neighbour(direction).is_none()
    }
}

/// Rectangle of goal cells.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GoalArea {
    pub origin: Coord,
    pub width: u8,
    pub height: u8,
}

impl GoalArea {
    pub const fn new(origin: Coord, width: u8, height: u8) -> Self {
        Self {
            origin,
            width,
            height,
        }
    }

    pub fn contains(&self, coord: Coord) -> bool {
        (self.origin.x..self.origin.x + self.width).contains(&coord.x)
            && (self.origin.y..self.origin.y + self.height).contains(&coord.y)
    }

    pub fn cells(&self) -> impl Iterator<Item = Coord> + '_ {
        (self.origin.y..self.origin.y + self.height).flat_map(move |y| {
            (self.origin.x..self.origin.x + self.width).map(move |x| Coord::new(x, y))
        })
    }
}

impl Default for GoalArea {
    fn default() -> Self {
        Self::new(
            Coord::new(MAZE_GOAL_X, MAZE_GOAL_Y),
            MAZE_GOAL_SIZE_X,
            MAZE_GOAL_SIZE_Y,
        )
    }
}

#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct Walls {
    pub north: bool,
    pub east: bool,
    pub south: bool,
    pub west: bool,
    pub known_north: bool,
    pub known_east: bool,
    pub known_south: bool,
    pub known_west: bool,
}

impl Walls {
    /// Fully observed walls from an existence nibble (bit 0 north .. bit 3 west).
    pub fn from_exist(exist: u8) -> Self {
        Self::from((exist & 0x0F) | 0xF0)
    }

    /// Observed walls around a mouse facing `heading`. The side it came from is open.
    pub fn from_relative(heading: Direction, front: bool, right: bool, left: bool) -> Self {
        let mut exist = 0;
        if front {
            exist |= heading.mask();
        }
        if right {
            exist |= heading.right().mask();
        }
        if left {
            exist |= heading.left().mask();
        }
        Self::from_exist(exist)
    }

    pub fn exist(&self, direction: Direction) -> bool {
        self.exist_bits() & direction.mask() != 0
    }

    pub fn known(&self, direction: Direction) -> bool {
        self.known_bits() & direction.mask() != 0
    }

    /// Records one wall as observed.
    pub fn set(&mut self, direction: Direction, exist: bool) {
        let mut bits = u8::from(*self) | (direction.mask() << 4);
        if exist {
            bits |= direction.mask();
        } else {
            bits &= !direction.mask();
        }
        *self = Self::from(bits);
    }

    pub fn exist_bits(&self) -> u8 {
        u8::from(*self) & 0x0F
    }

    pub fn known_bits(&self) -> u8 {
        u8::from(*self) >> 4
    }

    /// All four walls have been observed.
    pub fn is_visited(&self) -> bool {
        self.known_bits() == 0x0F
    }
}

pub struct Map {
    walls: [[Walls; MAZE_SIZE]; MAZE_SIZE],
    steps: [[u16; MAZE_SIZE]; MAZE_SIZE],
    update_queue: Queue<Coord, CELL_COUNT>,
    position: Coord,
    heading: Direction,
}

impl Map {
    pub fn new(goal: &GoalArea) -> Self {
        let mut map = Self {
            walls: [[Walls::new(); MAZE_SIZE]; MAZE_SIZE],
            steps: [[STEP_UNREACHED; MAZE_SIZE]; MAZE_SIZE],
            update_queue: Queue::new(),
            position: Coord::START,
            heading: Direction::North,
        };
        map.init_walls();
        map.init_steps_to_goal(goal);
        map
    }

    /// Forgets every observed wall except the outer boundary and the start cell's east wall.
    pub fn init_walls(&mut self) {
        for row in self.walls.iter_mut() {
            row.fill(Walls::new());
        }
        self.add_outer_walls();
        self.set_single_wall(Coord::START, Direction::East, true);
    }

    pub fn init_steps_to_goal(&mut self, goal: &GoalArea) {
        self.init_steps();
        for cell in goal.cells() {
            self.seed(cell);
        }
    }

    pub fn init_steps_to_start(&mut self) {
        self.init_steps();
        self.seed(Coord::START);
    }

    /// Breadth-first flood fill from the seeded cells. Unobserved walls count as open, except in
    /// `shortest` mode where only fully observed cells spread their step count.
    pub fn make_steps(&mut self, shortest: bool) {
        while let Some(coord) = self.update_queue.receive() {
            let walls = self.walls(coord);
            if shortest && !walls.is_visited() {
                continue;
            }
            let step = self.steps(coord);
            for direction in Direction::ALL {
                if walls.exist(direction) {
                    continue;
                }
                let Some(next) = coord.neighbour(direction) else {
                    continue;
                };
                if self.steps(next) == STEP_UNREACHED {
                    self.steps[usize::from(next.y)][usize::from(next.x)] = step + 1;
                    // every cell is queued at most once per fill
                    let _ = self.update_queue.send(next);
                }
            }
        }
    }

    /// Stores fully observed walls for a cell and mirrors them onto its neighbours. Boundary
    /// walls are kept regardless of `walls`.
    pub fn set_wall(&mut self, coord: Coord, walls: Walls) {
        for direction in Direction::ALL {
            let exist = walls.exist(direction) || coord.is_boundary(direction);
            self.set_single_wall(coord, direction, exist);
        }
    }

    /// Stores walls seen by a mouse standing in `coord` facing its current heading.
    pub fn set_wall_relative(&mut self, coord: Coord, front: bool, right: bool, left: bool) {
        self.set_wall(coord, Walls::from_relative(self.heading, front, right, left));
    }

    /// Best open neighbour of the current position: fewest steps, then straight ahead, then
    /// unvisited cells. `None` if no neighbour was reached by the flood fill.
    pub fn next_direction(&self) -> Option<Direction> {
        let walls = self.walls(self.position);
        let mut best: Option<(Direction, u16, u8)> = None;
        for direction in Direction::ALL {
            if walls.exist(direction) {
                continue;
            }
            let Some(next) = self.position.neighbour(direction) else {
                continue;
            };
            let step = self.steps(next);
            if step == STEP_UNREACHED {
                continue;
            }
            let priority = self.priority(next, direction);
            let better = match best {
                None => true,
                Some((_, min_step, best_priority)) => {
                    step < min_step || (step == min_step && priority > best_priority)
                }
            };
            if better {
                best = Some((direction, step, priority));
            }
        }
        best.map(|(direction, _, _)| direction)
    }

    fn priority(&self, next: Coord, direction: Direction) -> u8 {
        let mut priority = if direction == self.heading {
            2
        } else if direction == self.heading.reverse() {
            0
        } else {
            1
        };
        if !self.walls(next).is_visited() {
            priority += 4;
        }
        priority
    }

    pub fn set_position(&mut self, coord: Coord, heading: Direction) {
        self.position = coord;
        self.heading = heading;
    }

    /// Turns to `direction` and moves one cell. The position is unchanged at the boundary.
    pub fn advance(&mut self, direction: Direction) -> Coord {
        self.heading = direction;
        if let Some(next) = self.position.neighbour(direction) {
            self.position = next;
        }
        self.position
    }

    pub fn rotate_back(&mut self) {
        self.heading = self.heading.reverse();
    }

    pub fn in_goal(&self, goal: &GoalArea) -> bool {
        goal.contains(self.position)
    }

    pub fn in_start(&self) -> bool {
        self.position == Coord::START
    }

    pub fn position(&self) -> Coord {
        self.position
    }

    pub fn heading(&self) -> Direction {
        self.heading
    }

    pub fn walls(&self, coord: Coord) -> Walls {
        self.walls[usize::from(coord.y)][usize::from(coord.x)]
    }

    pub fn steps(&self, coord: Coord) -> u16 {
        self.steps[usize::from(coord.y)][usize::from(coord.x)]
    }

    pub fn export(&self) -> WallBytes {
        let mut bytes = [[0; MAZE_SIZE]; MAZE_SIZE];
        for (row, walls) in bytes.iter_mut().zip(self.walls.iter()) {
            for (byte, cell) in row.iter_mut().zip(walls.iter()) {
                *byte = u8::from(*cell);
            }
        }
        bytes
    }

    /// Loads stored wall bytes. An all-zero image leaves a freshly initialised map.
    pub fn import(&mut self, bytes: &WallBytes) {
        self.init_walls();
        if bytes.iter().flatten().all(|byte| *byte == 0) {
            return;
        }
        for (walls, row) in self.walls.iter_mut().zip(bytes.iter()) {
            for (cell, byte) in walls.iter_mut().zip(row.iter()) {
                *cell = Walls::from(*byte);
            }
        }
        self.add_outer_walls();
    }

    /// Renders the maze as text, with ANSI colours if `colored`.
    pub fn display(&self, colored: bool) -> MapDisplay<'_> {
        MapDisplay { map: self, colored }
    }

    fn init_steps(&mut self) {
        for row in self.steps.iter_mut() {
            row.fill(STEP_UNREACHED);
        }
        self.update_queue.reset();
    }

    fn seed(&mut self, coord: Coord) {
        self.steps[usize::from(coord.y)][usize::from(coord.x)] = 0;
        let _ = self.update_queue.send(coord);
    }

    fn add_outer_walls(&mut self) {
        for i in 0..MAZE_SIZE as u8 {
            self.set_single_wall(Coord::new(i, 0), Direction::South, true);
            self.set_single_wall(Coord::new(i, MAZE_SIZE as u8 - 1), Direction::North, true);
            self.set_single_wall(Coord::new(0, i), Direction::West, true);
            self.set_single_wall(Coord::new(MAZE_SIZE as u8 - 1, i), Direction::East, true);
        }
    }

    // Sets one wall on both cells sharing it.
    fn set_single_wall(&mut self, coord: Coord, direction: Direction, exist: bool) {
        self.walls[usize::from(coord.y)][usize::from(coord.x)].set(direction, exist);
        if let Some(next) = coord.neighbour(direction) {
            self.walls[usize::from(next.y)][usize::from(next.x)].set(direction.reverse(), exist);
        }
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new(&GoalArea::default())
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.display(false), f)
    }
}

const COLOR_UNKNOWN: &str = "\x1b[31m";
const COLOR_MOUSE: &str = "\x1b[34m";
const COLOR_RESET: &str = "\x1b[0m";

pub struct MapDisplay<'a> {
    map: &'a Map,
    colored: bool,
}

impl MapDisplay<'_> {
    fn color(&self, f: &mut fmt::Formatter<'_>, color: &str, text: &str) -> fmt::Result {
        if self.colored {
            write!(f, "{}{}{}", color, text, COLOR_RESET)
        } else {
            f.write_str(text)
        }
    }

    fn horizontal(
        &self,
        f: &mut fmt::Formatter<'_>,
        walls: Walls,
        direction: Direction,
    ) -> fmt::Result {
        f.write_str("+")?;
        if !walls.known(direction) {
            self.color(f, COLOR_UNKNOWN, " . ")
        } else if walls.exist(direction) {
            f.write_str("---")
        } else {
            f.write_str("   ")
        }
    }

    fn vertical(
        &self,
        f: &mut fmt::Formatter<'_>,
        walls: Walls,
        direction: Direction,
    ) -> fmt::Result {
        if !walls.known(direction) {
            self.color(f, COLOR_UNKNOWN, ":")
        } else if walls.exist(direction) {
            f.write_str("|")
        } else {
            f.write_str(" ")
        }
    }
}

impl fmt::Display for MapDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.map;
        for y in (0..MAZE_SIZE as u8).rev() {
            f.write_str("    ")?;
            for x in 0..MAZE_SIZE as u8 {
                self.horizontal(f, map.walls(Coord::new(x, y)), Direction::North)?;
            }
            f.write_str("+\n")?;

            write!(f, "{:>4}", y)?;
            for x in 0..MAZE_SIZE as u8 {
                let coord = Coord::new(x, y);
                self.vertical(f, map.walls(coord), Direction::West)?;
                if coord == map.position {
                    let arrow = match map.heading {
                        Direction::North => " ^ ",
                        Direction::East => " > ",
                        Direction::South => " v ",
                        Direction::West => " < ",
                    };
                    self.color(f, COLOR_MOUSE, arrow)?;
                } else {
                    match map.steps(coord) {
                        STEP_UNREACHED => f.write_str("   ")?,
                        step if step > 999 => f.write_str(" **")?,
                        step => write!(f, "{:>3}", step)?,
                    }
                }
            }
            self.vertical(
                f,
                map.walls(Coord::new(MAZE_SIZE as u8 - 1, y)),
                Direction::East,
            )?;
            f.write_str("\n")?;
        }

        f.write_str("    ")?;
        for x in 0..MAZE_SIZE as u8 {
            self.horizontal(f, map.walls(Coord::new(x, 0)), Direction::South)?;
        }
        f.write_str("+\n    ")?;
        for x in 0..MAZE_SIZE {
            write!(f, "{:>4}", x)?;
        }
        f.write_str("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_rotate() {
        assert_eq!(Direction::North.right(), Direction::East);
        assert_eq!(Direction::North.left(), Direction::West);
        assert_eq!(Direction::West.right(), Direction::North);
        assert_eq!(Direction::East.reverse(), Direction::West);
    }

    #[test]
    fn goal_area_contains_its_cells() {
        let goal = GoalArea::default();
        assert_eq!(goal.cells().count(), 9);
        assert!(goal.cells().all(|cell| goal.contains(cell)));
        assert!(!goal.contains(Coord::new(13, 14)));
        assert!(!goal.contains(Coord::new(17, 16)));
    }

    #[test]
    fn init_walls_marks_boundary_and_start() {
        let map = Map::default();
        let start = map.walls(Coord::START);
        assert!(start.exist(Direction::West));
        assert!(start.exist(Direction::South));
        assert!(start.exist(Direction::East));
        assert!(!start.known(Direction::North));
        assert!(map.walls(Coord::new(1, 0)).exist(Direction::West));
        assert!(map.walls(Coord::new(31, 31)).exist(Direction::North));
        assert!(map.walls(Coord::new(31, 31)).exist(Direction::East));
        assert!(!map.walls(Coord::new(5, 5)).known(Direction::North));
    }

    #[test]
    fn flood_fill_in_open_maze() {
        let mut map = Map::default();
        map.make_steps(false);
        assert_eq!(map.steps(Coord::new(15, 15)), 0);
        assert_eq!(map.steps(Coord::new(13, 14)), 1);
        // The start cell's east wall forces the first move north
        assert_eq!(map.steps(Coord::new(0, 1)), 27);
        assert_eq!(map.steps(Coord::START), 28);
        assert_eq!(map.next_direction(), Some(Direction::North));
    }

    #[test]
    fn shortest_flood_needs_visited_cells() {
        let mut map = Map::default();
        map.make_steps(true);
        // Goal cells spread nothing until observed
        assert_eq!(map.steps(Coord::new(13, 14)), STEP_UNREACHED);
        assert_eq!(map.steps(Coord::START), STEP_UNREACHED);

        map.set_position(Coord::new(5, 5), Direction::North);
        assert_eq!(map.next_direction(), None);
    }

    #[test]
    fn set_wall_mirrors_to_neighbours() {
        let mut map = Map::default();
        map.set_wall(Coord::new(3, 3), Walls::from_exist(0b0101));
        assert!(map.walls(Coord::new(3, 3)).is_visited());
        assert!(map.walls(Coord::new(3, 4)).exist(Direction::South));
        assert!(map.walls(Coord::new(3, 2)).exist(Direction::North));
        assert!(map.walls(Coord::new(4, 3)).known(Direction::West));
        assert!(!map.walls(Coord::new(4, 3)).exist(Direction::West));
    }

    #[test]
    fn set_wall_relative_rotates_with_heading() {
        let mut map = Map::default();
        map.set_position(Coord::new(0, 2), Direction::East);
        map.set_wall_relative(Coord::new(0, 2), true, false, true);
        let walls = map.walls(Coord::new(0, 2));
        assert!(walls.exist(Direction::East));
        assert!(walls.exist(Direction::North));
        assert!(!walls.exist(Direction::South));
        // Boundary stays although nothing was seen behind
        assert!(walls.exist(Direction::West));
    }

    #[test]
    fn next_direction_prefers_straight_then_unvisited() {
        let mut map = Map::default();
        map.set_position(Coord::new(5, 5), Direction::North);
        map.init_steps_to_goal(&GoalArea::new(Coord::new(6, 6), 1, 1));
        map.make_steps(false);
        // North and east are both one step from the goal
        assert_eq!(map.next_direction(), Some(Direction::North));

        map.set_wall(Coord::new(5, 6), Walls::from_exist(0));
        assert_eq!(map.next_direction(), Some(Direction::East));
    }

    #[test]
    fn advance_and_rotate() {
        let mut map = Map::default();
        assert!(map.in_start());
        assert_eq!(map.advance(Direction::North), Coord::new(0, 1));
        assert_eq!(map.advance(Direction::West), Coord::new(0, 1));
        assert_eq!(map.heading(), Direction::West);
        map.rotate_back();
        assert_eq!(map.heading(), Direction::East);
        map.set_position(Coord::new(15, 14), Direction::North);
        assert!(map.in_goal(&GoalArea::default()));
    }

    #[test]
    fn export_import_keeps_walls() {
        let mut map = Map::default();
        map.set_wall(Coord::new(7, 9), Walls::from_exist(0b1010));
        let bytes = map.export();

        let mut restored = Map::default();
        restored.import(&bytes);
        assert_eq!(restored.export(), bytes);

        restored.import(&[[0; MAZE_SIZE]; MAZE_SIZE]);
        assert_eq!(restored.export(), Map::default().export());
    }

    #[test]
    fn import_restores_boundary_from_damaged_image() {
        // Every wall known and open, boundary included
        let damaged = [[0xF0; MAZE_SIZE]; MAZE_SIZE];
        let mut map = Map::default();
        map.import(&damaged);

        let last = MAZE_SIZE as u8 - 1;
        for i in 0..MAZE_SIZE as u8 {
            assert!(map.walls(Coord::new(i, 0)).exist(Direction::South));
            assert!(map.walls(Coord::new(i, last)).exist(Direction::North));
            assert!(map.walls(Coord::new(0, i)).exist(Direction::West));
            assert!(map.walls(Coord::new(last, i)).exist(Direction::East));
        }
        // Inner walls come from the image
        let inner = map.walls(Coord::new(5, 5));
        assert!(inner.known(Direction::North));
        assert!(!inner.exist(Direction::North));
    }

    #[test]
    fn display_draws_mouse_and_walls() {
        let map = Map::default();
        let text = std::format!("{}", map);
        assert!(text.contains(" ^ "));
        assert!(text.contains("---"));
        assert!(!text.contains('\x1b'));
        assert!(std::format!("{}", map.display(true)).contains(COLOR_UNKNOWN));
    }
}
