use super::{ExecutionPort, Invocation};
use crate::error::ExecError;
use crate::image::ImageRef;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

#[derive(Debug, Clone)]
enum MockResponse {
    Output(String),
    Failure(String),
}

/// Scripted [`ExecutionPort`] keyed by image and [`Invocation::describe`].
///
/// Unscripted commands fail the way `cat` of a missing file does.
pub struct MockExecutor {
    responses: RwLock<HashMap<(String, String), MockResponse>>,
    prepare_failures: RwLock<HashSet<String>>,
    calls: Mutex<Vec<(ImageRef, String)>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(HashMap::new()),
            prepare_failures: RwLock::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every `execute` call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(&self, image: &str, command: &str, output: &str) {
        self.responses.write().unwrap().insert(
            (image.to_string(), command.to_string()),
            MockResponse::Output(output.to_string()),
        );
    }

    pub fn fail(&self, image: &str, command: &str, message: &str) {
        self.responses.write().unwrap().insert(
            (image.to_string(), command.to_string()),
            MockResponse::Failure(message.to_string()),
        );
    }

    pub fn fail_prepare(&self, image: &str) {
        self.prepare_failures
            .write()
            .unwrap()
            .insert(image.to_string());
    }

    /// Every `execute` call so far, in call order
    pub fn calls(&self) -> Vec<(ImageRef, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, image: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| i.as_str() == image)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Highest number of `execute` calls observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionPort for MockExecutor {
    async fn prepare(&self, image: &ImageRef) -> Result<(), ExecError> {
        if self.prepare_failures.read().unwrap().contains(image.as_str()) {
            return Err(ExecError::Pull {
                image: image.to_string(),
                message: "manifest unknown".to_string(),
            });
        }
        Ok(())
    }

    async fn execute(&self, image: &ImageRef, invocation: &Invocation) -> Result<String, ExecError> {
        let command = invocation.describe();
        self.calls
            .lock()
            .unwrap()
            .push((image.clone(), command.clone()));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let response = self
            .responses
            .read()
            .unwrap()
            .get(&(image.to_string(), command.clone()))
            .cloned();

        match response {
            Some(MockResponse::Output(output)) => Ok(output),
            Some(MockResponse::Failure(stderr)) => Err(ExecError::NonZeroExit {
                command,
                status: "exit status: 1".to_string(),
                stderr,
            }),
            None => Err(ExecError::NonZeroExit {
                stderr: format!("{}: No such file or directory", command),
                command,
                status: "exit status: 1".to_string(),
            }),
        }
    }
}
