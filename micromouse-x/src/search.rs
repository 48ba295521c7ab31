//! Cell-by-cell maze search and shortest path planning on top of [`Map`].

use heapless::Vec;

use crate::maze::{Coord, Direction, GoalArea, Map, Walls, STEP_UNREACHED};
use crate::parameters::MAZE_SIZE;

/// Longest path a plan can hold.
pub const PATH_CAPACITY: usize = MAZE_SIZE * MAZE_SIZE;

pub type Path = Vec<Direction, PATH_CAPACITY>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SearchPhase {
    ToGoal,
    ToStart,
    Finished,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SearchStep {
    /// Move one cell this way
    Move(Direction),
    /// Target reached, the next step heads for the new one
    PhaseChanged(SearchPhase),
    /// Back at the start and turned around
    Finished,
    /// No reachable cell leads toward the target
    Stuck,
}

/// Turn needed to face `next` from `heading`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    Forward,
    TurnRight,
    TurnLeft,
    TurnBack,
}

impl Action {
    pub fn between(heading: Direction, next: Direction) -> Self {
        if next == heading {
            Action::Forward
        } else if next == heading.right() {
            Action::TurnRight
        } else if next == heading.left() {
            Action::TurnLeft
        } else {
            Action::TurnBack
        }
    }
}

/// Search run: reach the goal with unknown walls treated as open, then return to the start.
pub struct Search {
    goal: GoalArea,
    phase: SearchPhase,
}

impl Search {
    pub fn new(goal: GoalArea) -> Self {
        Self {
            goal,
            phase: SearchPhase::ToGoal,
        }
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn goal(&self) -> &GoalArea {
        &self.goal
    }

    /// Records `walls` at the current cell and decides the next move.
    pub fn step(&mut self, map: &mut Map, walls: Walls) -> SearchStep {
        if self.phase == SearchPhase::Finished {
            return SearchStep::Finished;
        }
        map.set_wall(map.position(), walls);

        match self.phase {
            SearchPhase::ToGoal => {
                if map.in_goal(&self.goal) {
                    self.phase = SearchPhase::ToStart;
                    return SearchStep::PhaseChanged(SearchPhase::ToStart);
                }
                map.init_steps_to_goal(&self.goal);
            }
            SearchPhase::ToStart => {
                if map.in_start() {
                    map.rotate_back();
                    self.phase = SearchPhase::Finished;
                    return SearchStep::Finished;
                }
                map.init_steps_to_start();
            }
            SearchPhase::Finished => return SearchStep::Finished,
        }
        map.make_steps(false);

        match map.next_direction() {
            Some(direction) => {
                map.advance(direction);
                SearchStep::Move(direction)
            }
            None => SearchStep::Stuck,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlanError {
    /// No route through observed cells connects start and goal
    Unreachable,
    TooLong,
}

/// Directions from the start cell to the goal through fully observed cells only. Leaves the
/// map's step counts flooded in shortest mode.
pub fn plan_shortest(map: &mut Map, goal: &GoalArea) -> Result<Path, PlanError> {
    map.init_steps_to_goal(goal);
    map.make_steps(true);

    let mut path = Path::new();
    let mut coord = Coord::START;
    let mut heading = Direction::North;
    let mut step = map.steps(coord);
    if step == STEP_UNREACHED {
        return Err(PlanError::Unreachable);
    }

    while step > 0 {
        let walls = map.walls(coord);
        // Same heading first so straights stay long
        let candidates = [heading, heading.right(), heading.left(), heading.reverse()];
        let (direction, next) = candidates
            .into_iter()
            .filter(|direction| walls.known(*direction) && !walls.exist(*direction))
            .filter_map(|direction| coord.neighbour(direction).map(|next| (direction, next)))
            .find(|(_, next)| map.steps(*next) == step - 1)
            .ok_or(PlanError::Unreachable)?;
        path.push(direction).map_err(|_| PlanError::TooLong)?;
        coord = next;
        heading = direction;
        step -= 1;
    }
    Ok(path)
}

/// Fast-run manoeuvre: a straight over several cells or a turn in place.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Segment {
    Forward(u16),
    Turn(Action),
}

/// Joins consecutive moves in the same direction into one straight. A zigzag needs two
/// segments per cell, so a long enough path can overflow the segment list.
pub fn compress(
    heading: Direction,
    path: &[Direction],
) -> Result<Vec<Segment, PATH_CAPACITY>, PlanError> {
    let mut segments = Vec::new();
    let mut heading = heading;
    for direction in path {
        let action = Action::between(heading, *direction);
        if action != Action::Forward {
            segments
                .push(Segment::Turn(action))
                .map_err(|_| PlanError::TooLong)?;
            heading = *direction;
        }
        match segments.last_mut() {
            Some(Segment::Forward(cells)) => *cells += 1,
            _ => segments
                .push(Segment::Forward(1))
                .map_err(|_| PlanError::TooLong)?,
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::WallBytes;

    // True layout with the outer walls, the start cell's east wall and a long wall east of
    // column 3 that leaves only the top row open.
    fn test_maze() -> WallBytes {
        let mut truth = Map::default();
        for y in 0..MAZE_SIZE as u8 {
            for x in 0..MAZE_SIZE as u8 {
                let coord = Coord::new(x, y);
                let mut walls = truth.walls(coord);
                for direction in Direction::ALL {
                    if !walls.known(direction) {
                        walls.set(direction, false);
                    }
                }
                if x == 3 && y < MAZE_SIZE as u8 - 1 {
                    walls.set(Direction::East, true);
                }
                if x == 4 && y < MAZE_SIZE as u8 - 1 {
                    walls.set(Direction::West, true);
                }
                if x == 0 && y == 0 {
                    walls.set(Direction::East, true);
                }
                if x == 1 && y == 0 {
                    walls.set(Direction::West, true);
                }
                truth.set_wall(coord, walls);
            }
        }
        truth.export()
    }

    fn observe(truth: &WallBytes, coord: Coord) -> Walls {
        Walls::from_exist(truth[usize::from(coord.y)][usize::from(coord.x)])
    }

    fn search(map: &mut Map, truth: &WallBytes) -> usize {
        let mut search = Search::new(GoalArea::default());
        let mut moves = 0;
        loop {
            match search.step(map, observe(truth, map.position())) {
                SearchStep::Move(_) => moves += 1,
                SearchStep::PhaseChanged(phase) => assert_eq!(phase, SearchPhase::ToStart),
                SearchStep::Finished => return moves,
                SearchStep::Stuck => panic!("search stuck at {:?}", map.position()),
            }
            assert!(moves < 10_000);
        }
    }

    #[test]
    fn actions_between_headings() {
        assert_eq!(Action::between(Direction::North, Direction::North), Action::Forward);
        assert_eq!(Action::between(Direction::North, Direction::East), Action::TurnRight);
        assert_eq!(Action::between(Direction::North, Direction::West), Action::TurnLeft);
        assert_eq!(Action::between(Direction::East, Direction::West), Action::TurnBack);
    }

    #[test]
    fn search_reaches_goal_and_returns() {
        let truth = test_maze();
        let mut map = Map::default();
        let moves = search(&mut map, &truth);

        assert!(moves > 0);
        assert!(map.in_start());
        assert_eq!(map.heading(), Direction::North);
        // Walls seen along the way match the real maze
        // The only way past the long wall is through the top row
        let corner = map.walls(Coord::new(3, 31));
        assert!(corner.known(Direction::East));
        assert!(!corner.exist(Direction::East));
    }

    #[test]
    fn plan_after_search_follows_open_cells() {
        let truth = test_maze();
        let mut map = Map::default();
        search(&mut map, &truth);

        let goal = GoalArea::default();
        let path = plan_shortest(&mut map, &goal).unwrap();

        let mut coord = Coord::START;
        for direction in &path {
            assert!(!observe(&truth, coord).exist(*direction));
            coord = coord.neighbour(*direction).unwrap();
        }
        assert!(goal.contains(coord));
        // Detour over the top row: up 31, across 14, down 15 at least
        assert!(path.len() >= 31 + 14 + 15);
    }

    #[test]
    fn plan_without_observations_fails() {
        let mut map = Map::default();
        assert_eq!(
            plan_shortest(&mut map, &GoalArea::default()),
            Err(PlanError::Unreachable)
        );
    }

    #[test]
    fn stuck_when_goal_is_walled_off() {
        let mut map = Map::default();
        map.set_wall(Coord::new(0, 1), Walls::from_exist(0b1111));
        map.set_position(Coord::new(0, 0), Direction::North);
        let mut search = Search::new(GoalArea::default());
        let step = search.step(&mut map, Walls::from_exist(0b1110));
        assert_eq!(step, SearchStep::Stuck);
    }

    #[test]
    fn compress_joins_straights() {
        use Direction::*;
        let segments = compress(North, &[North, North, East, East, East, South]).unwrap();
        assert_eq!(
            segments.as_slice(),
            &[
                Segment::Forward(2),
                Segment::Turn(Action::TurnRight),
                Segment::Forward(3),
                Segment::Turn(Action::TurnRight),
                Segment::Forward(1),
            ]
        );
    }

    #[test]
    fn compress_rejects_zigzag_longer_than_capacity() {
        use Direction::*;
        let zigzag: Path = (0..PATH_CAPACITY)
            .map(|i| if i % 2 == 0 { North } else { East })
            .collect();
        assert_eq!(compress(North, &zigzag), Err(PlanError::TooLong));

        // Half as many cells fits, and every cell is still covered
        let segments = compress(North, &zigzag[..PATH_CAPACITY / 2]).unwrap();
        let cells: usize = segments
            .iter()
            .map(|segment| match segment {
                Segment::Forward(cells) => usize::from(*cells),
                Segment::Turn(_) => 0,
            })
            .sum();
        assert_eq!(cells, PATH_CAPACITY / 2);
        assert!(matches!(segments.last(), Some(Segment::Forward(_))));
    }
}
