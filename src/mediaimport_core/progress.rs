use crossbeam_channel::{Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Receives the current step name and line-level detail while an import runs.
///
/// Calls may arrive on the import's worker thread; implementations do their own thread hop.
pub trait ImportProgress {
    fn set_current_step(&self, step: &str);
    fn set_step_detail(&self, detail: &str);
}

/// Progress that only goes to the log.
pub struct LogProgress;

impl ImportProgress for LogProgress {
    fn set_current_step(&self, step: &str) {
        log::info!("Import step: {}", step);
    }

    fn set_step_detail(&self, detail: &str) {
        log::info!(" --> {}", detail);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Step(String),
    Detail(String),
}

/// Forwards progress over a channel to whichever thread owns the display.
pub struct ChannelProgress {
    sender: Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("Progress receiver is gone");
        }
    }
}

impl ImportProgress for ChannelProgress {
    fn set_current_step(&self, step: &str) {
        LogProgress.set_current_step(step);
        self.send(ProgressEvent::Step(step.to_string()));
    }

    fn set_step_detail(&self, detail: &str) {
        LogProgress.set_step_detail(detail);
        self.send(ProgressEvent::Detail(detail.to_string()));
    }
}

/// Draw progress events on the terminal until every sender is dropped.
/// Returns the full transcript of steps and details.
pub fn render_events(receiver: Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let mut transcript = Vec::new();
    for event in receiver {
        match &event {
            ProgressEvent::Step(step) => {
                spinner.println(format!("{}:", step));
                spinner.set_message(step.clone());
            }
            ProgressEvent::Detail(detail) => spinner.println(format!("  {}", detail)),
        }
        transcript.push(event);
    }

    spinner.finish_with_message("Done with import");
    transcript
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_channel_progress_forwards_in_order() {
        let (tx, rx) = unbounded();
        let progress = ChannelProgress::new(tx);
        progress.set_current_step("Setting up");
        progress.set_step_detail("Moving a to b");
        drop(progress);

        let events: Vec<ProgressEvent> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                ProgressEvent::Step("Setting up".to_string()),
                ProgressEvent::Detail("Moving a to b".to_string()),
            ]
        );
    }

    #[test]
    fn test_send_after_receiver_dropped_is_harmless() {
        let (tx, rx) = unbounded();
        drop(rx);
        ChannelProgress::new(tx).set_step_detail("nobody listening");
    }

    #[test]
    fn test_render_events_collects_transcript() {
        let (tx, rx) = unbounded();
        let worker = std::thread::spawn(move || {
            let progress = ChannelProgress::new(tx);
            progress.set_current_step("Converting videos");
            progress.set_step_detail("MVI_0001.MOV");
        });
        let transcript = render_events(rx);
        worker.join().unwrap();
        assert_eq!(transcript.len(), 2);
    }
}
