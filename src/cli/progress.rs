use std::collections::HashSet;
use std::fmt::Display;
use std::time::Duration;

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::plan::TaskKey;
use crate::Result;

#[derive(Debug, PartialEq, Eq)]
pub enum StepStatus {
    Done,
    Pending,
    InProgress,
    Disabled,
    Skipped,
    Failed,
}

pub struct StepContext {
    step_num: usize,
    steps: Vec<Step>,
}

pub struct Step {
    desc: &'static str,
    key: TaskKey,
    progress_bar: ProgressBar,
    disabled: bool,
}

impl Step {
    fn new(desc: &'static str, key: TaskKey, disabled: bool) -> Self {
        Self {
            desc,
            key,
            progress_bar: ProgressBar::new_spinner(),
            disabled,
        }
    }
}

impl StepContext {
    pub fn new(tasks: &HashSet<TaskKey>) -> Self {
        println!("Tasks:");

        let optional = |key| !tasks.contains(&key);
        let mut steps = vec![
            Step::new("Generate plan", TaskKey::GeneratePlan, false),
            Step::new("Generate netlist", TaskKey::GenerateNetlist, false),
            Step::new("Check netlist", TaskKey::CheckNetlist, false),
            Step::new(
                "Flatten netlist",
                TaskKey::FlattenNetlist,
                optional(TaskKey::FlattenNetlist),
            ),
            Step::new(
                "Generate testbench",
                TaskKey::GenerateTestbench,
                optional(TaskKey::GenerateTestbench),
            ),
        ];

        let mp = MultiProgress::new();
        let num_steps = steps.iter().filter(|step| !step.disabled).count();
        let mut counter = 0;
        let width = format!("{}", num_steps).len();
        for (i, step) in steps.iter_mut().enumerate() {
            mp.insert(i + 1, step.progress_bar.clone());
            if step.disabled {
                let msg = format!("[-/-] {}", step.desc);
                step.set_status(StepStatus::Disabled, Some(msg));
            } else {
                counter += 1;
                let msg = format!("[{:width$}/{:width$}] {}", counter, num_steps, step.desc);
                step.set_status(StepStatus::Pending, Some(msg));
            }
        }
        steps[0].set_status(StepStatus::InProgress, None);

        StepContext { step_num: 0, steps }
    }

    pub fn advance(&mut self) {
        self.step_num += 1;
        while let Some(current_step) = self.current_step() {
            if !current_step.disabled {
                break;
            }
            self.step_num += 1;
        }
    }

    #[inline]
    pub fn current_step(&mut self) -> Option<&mut Step> {
        self.steps.get_mut(self.step_num)
    }

    /// Marks the current step as failed and the remaining steps as skipped
    /// if `res` is an error.
    pub fn check<T>(&mut self, res: Result<T>) -> Result<T> {
        if res.is_err() {
            if let Some(current_step) = self.current_step() {
                current_step.set_status(StepStatus::Failed, None);
                self.advance();
                while let Some(current_step) = self.current_step() {
                    current_step.set_status(StepStatus::Skipped, None);
                    self.advance();
                }
            }
            println!("\n");
        }

        res
    }

    pub fn finish(&mut self, key: TaskKey) {
        let Some(current_step) = self.current_step() else {
            log::warn!("step {key:?} finished after all steps were completed");
            return;
        };
        if current_step.key != key {
            log::warn!(
                "step {key:?} finished out of order (expected {:?})",
                current_step.key
            );
            return;
        }

        current_step.set_status(StepStatus::Done, None);
        self.advance();

        if let Some(current_step) = self.current_step() {
            current_step.set_status(StepStatus::InProgress, None);
        } else {
            self.done();
        }
    }

    pub fn done(&mut self) {
        println!("\n\nCompleted all tasks");
    }
}

fn format_template(spinner: bool, status: impl Display) -> String {
    if spinner {
        format!("{{spinner:.green}} {:16} {{msg}}", status)
    } else {
        format!("  {:16} {{msg}}", status)
    }
}

impl Step {
    fn set_status(&mut self, status: StepStatus, msg: Option<String>) {
        let status_template = match status {
            StepStatus::Disabled => {
                format_template(false, "Disabled".truecolor(120, 120, 120).bold())
            }
            StepStatus::Done => format_template(false, "Done".green().bold()),
            StepStatus::Failed => format_template(false, "Failed".bright_white().on_red().bold()),
            StepStatus::InProgress => format_template(true, "In Progress".bright_white().bold()),
            StepStatus::Pending => format_template(true, "Pending".blue().bold()),
            StepStatus::Skipped => format_template(false, "Skipped".yellow().bold()),
        };
        match ProgressStyle::with_template(&status_template) {
            Ok(style) => self.progress_bar.set_style(style),
            Err(e) => log::warn!("invalid progress template: {e}"),
        }

        if let Some(msg) = msg {
            self.progress_bar.set_message(msg);
        }

        if status == StepStatus::InProgress {
            self.progress_bar
                .enable_steady_tick(Duration::from_millis(200));
        } else if status != StepStatus::Pending {
            self.progress_bar.finish();
        }
    }
}
