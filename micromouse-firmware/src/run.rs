use defmt::*;
use embassy_futures::select::{select, Either};

use micromouse_x::buzzer::Melody;
use micromouse_x::datatypes::MouseState;
use micromouse_x::maze::{Coord, Direction, GoalArea, Walls};
use micromouse_x::motion::{MotionDirection, MotionParameter};
use micromouse_x::parameters::{
    CELL_LENGTH, FAST_RUN_ACCELERATION, FAST_RUN_VELOCITY, SEARCH_ACCELERATION, SEARCH_VELOCITY,
    TURN_ANGULAR_ACCELERATION, TURN_ANGULAR_VELOCITY,
};
use micromouse_x::search::{
    compress, plan_shortest, Action, PlanError, Search, SearchPhase, SearchStep, Segment,
};

use crate::datatypes::{
    BuzzerQueue, MotionDoneSignal, MotionQueue, MouseStatus, PersistentDataChannel,
    PersistentDataUpdate, RunRequest, RunRequestChannel, SensedSignal, SharedMap, StopSignal,
};
use crate::xerror::{XError, XResult};

/// Hands manoeuvres to the control loop one at a time and waits for each to finish.
pub struct Run {
    motion_queue: &'static MotionQueue,
    done: &'static MotionDoneSignal,
    stop: &'static StopSignal,
}

impl Run {
    pub fn new(
        motion_queue: &'static MotionQueue,
        done: &'static MotionDoneSignal,
        stop: &'static StopSignal,
    ) -> Self {
        Self {
            motion_queue,
            done,
            stop,
        }
    }

    /// Forgets a stop request left over from an earlier run.
    pub fn arm(self: &Self) {
        self.stop.reset();
    }

    pub async fn straight(
        self: &Self,
        direction: MotionDirection,
        length: f32,
        acceleration: f32,
        max_velocity: f32,
        end_velocity: f32,
    ) -> XResult<()> {
        let param =
            MotionParameter::straight(direction, length, acceleration, max_velocity, end_velocity)
                .with_side_wall_adjust(true);
        self.execute(param).await
    }

    pub async fn turn(
        self: &Self,
        degree: f32,
        angular_acceleration: f32,
        max_angular_velocity: f32,
        direction: MotionDirection,
    ) -> XResult<()> {
        let param =
            MotionParameter::turn(direction, degree, angular_acceleration, max_angular_velocity);
        self.execute(param).await
    }

    pub async fn stop(self: &Self) -> XResult<()> {
        self.execute(MotionParameter::stop()).await
    }

    /// Releases the motors. Does not wait for the control loop.
    pub fn free(self: &Self) {
        self.motion_queue.overwrite(MotionParameter::free());
    }

    async fn execute(self: &Self, param: MotionParameter) -> XResult<()> {
        self.done.reset();
        self.motion_queue.overwrite(param);
        match select(self.done.wait(), self.stop.wait()).await {
            Either::First(_) => Ok(()),
            Either::Second(_) => Err(XError::Aborted),
        }
    }

    async fn act(self: &Self, action: Action) -> XResult<()> {
        let (degree, direction) = match action {
            Action::Forward => return Ok(()),
            Action::TurnRight => (90.0, MotionDirection::Right),
            Action::TurnLeft => (90.0, MotionDirection::Left),
            Action::TurnBack => (180.0, MotionDirection::Left),
        };
        self.turn(
            degree,
            TURN_ANGULAR_ACCELERATION,
            TURN_ANGULAR_VELOCITY,
            direction,
        )
        .await
    }
}

/// Everything the run task shares with the rest of the firmware.
pub struct RunContext {
    pub run: Run,
    pub requests: &'static RunRequestChannel,
    pub map: &'static SharedMap,
    pub sensed: &'static SensedSignal,
    pub status: &'static MouseStatus,
    pub buzzer: &'static BuzzerQueue,
    pub persistent_data: &'static PersistentDataChannel,
}

impl RunContext {
    fn play(self: &Self, melody: Melody) {
        if self.buzzer.send(melody).is_err() {
            debug!("Buzzer queue full; dropped {:?}", melody);
        }
    }

    async fn save_maze(self: &Self) {
        let walls = self.map.lock(|map| map.borrow().export());
        self.persistent_data
            .send(PersistentDataUpdate::MazeWalls(walls))
            .await;
    }

    async fn search(self: &Self) -> XResult<()> {
        let mut search = Search::new(GoalArea::default());
        self.map
            .lock(|map| map.borrow_mut().set_position(Coord::START, Direction::North));

        loop {
            // Walls as seen from the centre of the current cell
            let sensed = self.sensed.wait().await;
            let (heading, step) = self.map.lock(|map| {
                let mut map = map.borrow_mut();
                let heading = map.heading();
                let walls = Walls::from_relative(
                    heading,
                    sensed.walls.front(),
                    sensed.walls.right(),
                    sensed.walls.left(),
                );
                (heading, search.step(&mut map, walls))
            });

            match step {
                SearchStep::Move(direction) => {
                    self.run.act(Action::between(heading, direction)).await?;
                    self.run
                        .straight(
                            MotionDirection::Forward,
                            CELL_LENGTH,
                            SEARCH_ACCELERATION,
                            SEARCH_VELOCITY,
                            0.0,
                        )
                        .await?;
                }
                SearchStep::PhaseChanged(SearchPhase::ToStart) => {
                    info!("Goal reached; returning to start.");
                    self.status.set(MouseState::Returning);
                    self.play(Melody::Goal);
                }
                SearchStep::PhaseChanged(_) => {}
                SearchStep::Finished => {
                    self.run.act(Action::TurnBack).await?;
                    self.save_maze().await;
                    self.play(Melody::Accept);
                    return Ok(());
                }
                SearchStep::Stuck => {
                    error!("Search stuck at {:?}.", self.map.lock(|map| map.borrow().position()));
                    self.save_maze().await;
                    return Err(XError::Invalid);
                }
            }
        }
    }

    async fn shortest_run(self: &Self) -> XResult<()> {
        let goal = GoalArea::default();
        let segments: Result<_, PlanError> = self.map.lock(|map| {
            let mut map = map.borrow_mut();
            let path = plan_shortest(&mut map, &goal)?;
            map.set_position(Coord::START, Direction::North);
            compress(Direction::North, &path)
        });
        let segments = match segments {
            Ok(segments) => segments,
            Err(e) => {
                warn!("No fast run plan: {:?}", e);
                return Err(XError::Invalid);
            }
        };
        info!("Fast run over {} segments.", segments.len());

        for segment in segments.iter() {
            match *segment {
                Segment::Forward(cells) => {
                    self.run
                        .straight(
                            MotionDirection::Forward,
                            f32::from(cells) * CELL_LENGTH,
                            FAST_RUN_ACCELERATION,
                            FAST_RUN_VELOCITY,
                            0.0,
                        )
                        .await?
                }
                Segment::Turn(action) => self.run.act(action).await?,
            }
        }
        self.play(Melody::Goal);
        Ok(())
    }

    async fn clear_maze(self: &Self) {
        self.map.lock(|map| map.borrow_mut().init_walls());
        self.save_maze().await;
        self.play(Melody::Accept);
    }
}

#[embassy_executor::task]
pub async fn run_task(context: RunContext) -> ! {
    loop {
        let request = context.requests.receive().await;
        info!("Run request: {:?}", request);
        context.run.arm();

        let result = match request {
            RunRequest::Search => {
                context.status.set(MouseState::Searching);
                context.search().await
            }
            RunRequest::ShortestRun => {
                context.status.set(MouseState::FastRun);
                context.shortest_run().await
            }
            RunRequest::ClearMaze => {
                context.clear_maze().await;
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                let _ = context.run.stop().await;
                context.status.set(MouseState::Idle);
            }
            Err(XError::Aborted) => info!("Run stopped."),
            Err(e) => {
                error!("Run failed: {:?}", e);
                context.play(Melody::Error);
                context.status.set(MouseState::Error);
            }
        }
        context.run.free();
    }
}
