// Lane x read x tile walk producing one conversion task per tile

use crate::utils::file::remote_join;
use crate::utils::manifest::TaskDescriptor;
use crate::utils::run_dir::{ReadDefinition, RunDescriptor};

/// Values shared by every task of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskParams {
    pub converter: String,
    pub module: Option<String>,
    pub output_dir: String,
}

pub struct TaskEnumerator<'a, R: RunDescriptor> {
    run: &'a R,
    params: &'a TaskParams,
}

impl<'a, R: RunDescriptor> TaskEnumerator<'a, R> {
    pub fn new(run: &'a R, params: &'a TaskParams) -> Self {
        TaskEnumerator { run, params }
    }

    /// Number of tasks [`TaskEnumerator::tasks`] yields: lanes x reads x tiles.
    pub fn task_count(&self) -> usize {
        self.run.lanes().len() * self.run.reads().len() * self.run.tiles().len()
    }

    /// Lazily yields every task, lane outermost and tile innermost, so all the
    /// tiles of one lane and read are contiguous.
    pub fn tasks(&self) -> impl Iterator<Item = TaskDescriptor> + '_ {
        let run = self.run;
        run.lanes().iter().flat_map(move |&lane| {
            run.reads()
                .iter()
                .flat_map(move |read| run.tiles().iter().map(move |&tile| self.describe(lane, read, tile)))
        })
    }

    fn describe(&self, lane: u32, read: &ReadDefinition, tile: u32) -> TaskDescriptor {
        let run = self.run;
        TaskDescriptor {
            converter: self.params.converter.clone(),
            module: self.params.module.clone(),
            instrument: run.instrument().to_string(),
            run_id: run.run_id().to_string(),
            input_dir: run.base_calls_dir(),
            lane,
            read: read.index(),
            first_cycle: read.first_cycle(),
            cycle_count: read.cycle_count(),
            tile,
            filter_file: run.filter_path(lane, tile),
            control_file: run.control_path(lane, tile),
            positions_file: run.positions_path(lane, tile),
            // Only a suggestion: the worker decides where its output really goes.
            qseq_file: remote_join(&self.params.output_dir, &run.qseq_name(lane, tile, read.index())),
        }
    }
}
