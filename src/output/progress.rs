//! Progress bar utilities.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::task::{TaskHandle, TaskOutcome};

/// Create a spinner for long-running operations.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

/// Create a progress bar counting the segments of one stream.
pub fn create_segment_bar(total: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.set_message(message.to_string());
    bar
}

/// Mirror a task's progress on a bar in `multi` until the task ends.
pub async fn follow_task(task: TaskHandle, multi: MultiProgress, label: String) -> TaskOutcome {
    let bar = multi.add(create_segment_bar(0, &label));
    let mut rx = task.subscribe();

    loop {
        let (done, total, outcome) = {
            let snapshot = rx.borrow_and_update();
            (
                snapshot.segments_done as u64,
                snapshot.segments_total as u64,
                snapshot.outcome(),
            )
        };
        bar.set_length(total);
        bar.set_position(done);

        if let Some(outcome) = outcome {
            match &outcome {
                TaskOutcome::Completed(_) => bar.finish_with_message(format!("{} done", label)),
                TaskOutcome::Failed(_) => bar.abandon_with_message(format!("{} failed", label)),
                TaskOutcome::Cancelled => {
                    bar.abandon_with_message(format!("{} cancelled", label))
                }
            }
            return outcome;
        }

        if rx.changed().await.is_err() {
            bar.abandon();
            return task.wait().await;
        }
    }
}
