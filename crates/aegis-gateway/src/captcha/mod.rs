//! Image-classification CAPTCHA tasks.
//!
//! A task shows `complexity` image slots; half are drawn from one template
//! ("correct") and half from strictly different templates ("distractors").
//! The solution is the sorted list of correct slot indices.

mod library;
mod noise;

pub use library::{Template, TemplateLibrary};

use aegis_common::constants::CHALLENGE_TTL_SECS;
use aegis_common::{AegisError, Complexity};
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// A generated classification task.
#[derive(Debug, Clone)]
pub struct CaptchaTask {
    pub id: u32,
    pub description: String,
    /// base64 JPEGs, one per slot
    pub images: Vec<String>,
    /// Sorted correct slot indices; never sent to the client
    pub solution: Vec<usize>,
    created_at: DateTime<Utc>,
}

/// A solution posted by the client.
#[derive(Debug, Deserialize)]
pub struct Solution {
    pub id: u32,
    #[serde(default)]
    pub solution: Vec<usize>,
}

/// Builds and verifies classification tasks over the template library.
pub struct CaptchaManager {
    slots: usize,
    library_path: PathBuf,
    library: RwLock<Arc<TemplateLibrary>>,
    tasks: RwLock<HashMap<u32, CaptchaTask>>,
}

impl CaptchaManager {
    pub fn new(complexity: Complexity, library: TemplateLibrary, library_path: PathBuf) -> Self {
        Self {
            slots: complexity.captcha_slots(),
            library_path,
            library: RwLock::new(Arc::new(library)),
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Build a new task and register it under a unique random id.
    pub fn task(&self) -> Result<CaptchaTask, AegisError> {
        let library = self
            .library
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        // Distractors must come from a different template
        if library.len() < 2 {
            return Err(AegisError::Internal(
                "template library needs at least two templates".to_string(),
            ));
        }

        let mut rng = rand::rng();
        let template_idx = rng.random_range(0..library.len());

        let mut order: Vec<usize> = (0..self.slots).collect();
        order.shuffle(&mut rng);
        let mut solution = order[..self.slots / 2].to_vec();
        solution.sort_unstable();

        let mut images = vec![String::new(); self.slots];
        for (position, &slot) in order.iter().enumerate() {
            let source = if position < self.slots / 2 {
                template_idx
            } else {
                loop {
                    let other = rng.random_range(0..library.len());
                    if other != template_idx {
                        break other;
                    }
                }
            };
            images[slot] = library.image(source, slot).cloned().unwrap_or_default();
        }

        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let id = loop {
            let id = rng.random::<u32>();
            if !tasks.contains_key(&id) {
                break id;
            }
        };
        let task = CaptchaTask {
            id,
            description: library.description(template_idx).to_string(),
            images,
            solution,
            created_at: Utc::now(),
        };
        tasks.insert(id, task.clone());
        Ok(task)
    }

    /// Compare a posted solution against the stored task. The task is
    /// deleted on any outcome, so a failed attempt requires a fresh task.
    pub fn verify(&self, solution: &Solution) -> bool {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        match tasks.remove(&solution.id) {
            Some(task) => task.solution == solution.solution,
            None => false,
        }
    }

    /// Delete tasks older than the challenge TTL.
    pub fn sweep(&self) {
        let deadline = Utc::now() - Duration::seconds(CHALLENGE_TTL_SECS);
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|_, task| task.created_at > deadline);
    }

    /// Solution stored for a live task. Test support only.
    #[cfg(test)]
    pub(crate) fn stored_solution(&self, id: u32) -> Option<Vec<usize>> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        tasks.get(&id).map(|task| task.solution.clone())
    }

    /// Reload the template library from disk. A failed load keeps the
    /// current set untouched.
    pub fn reload(&self) {
        match TemplateLibrary::load(&self.library_path) {
            Ok(library) => {
                let mut current = self.library.write().unwrap_or_else(PoisonError::into_inner);
                *current = Arc::new(library);
                tracing::debug!(
                    path = %self.library_path.display(),
                    templates = current.len(),
                    "Reloaded CAPTCHA template library"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.library_path.display(),
                    error = %e,
                    "CAPTCHA template reload failed, keeping current set"
                );
            }
        }
    }
}
