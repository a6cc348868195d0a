//! Bounded worker pools for artifact generation

use crate::config::GenerationSettings;
use doodle_core::HardwareTier;
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Worker counts for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulePlan {
    /// Concurrent image generations
    pub image_workers: usize,
    /// Concurrent speech generations
    pub audio_workers: usize,
}

impl SchedulePlan {
    /// Image work is serialized unless the accelerator has room for more
    /// than one model; speech uses every core unless configured otherwise.
    pub fn for_host(tier: HardwareTier, logical_cores: usize, settings: &GenerationSettings) -> Self {
        let image_workers = match tier {
            HardwareTier::HighVram => settings.max_image_workers.max(1),
            HardwareTier::CpuOnly | HardwareTier::LowVram => 1,
        };
        let audio_workers = match settings.max_audio_workers {
            0 => logical_cores.max(1),
            n => n,
        };
        Self {
            image_workers,
            audio_workers,
        }
    }
}

/// Run `work` over `items` on at most `workers` threads.
///
/// Results come back in input order. A panic inside `work` is caught and
/// returned as that item's `Err(message)`; the worker moves on.
pub(crate) fn run_bounded<T, R, F>(pool: &str, items: &[T], workers: usize, work: F) -> Vec<Result<R, String>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<Result<R, String>>>> =
        Mutex::new((0..items.len()).map(|_| None).collect());
    let workers = workers.clamp(1, items.len().max(1));

    let drain = || loop {
        let index = next.fetch_add(1, Ordering::SeqCst);
        let Some(item) = items.get(index) else {
            break;
        };
        let result = catch_unwind(AssertUnwindSafe(|| work(item))).map_err(panic_message);
        slots.lock().unwrap_or_else(|e| e.into_inner())[index] = Some(result);
    };

    std::thread::scope(|s| {
        let mut spawned = 0;
        for n in 0..workers {
            let builder = std::thread::Builder::new().name(format!("doodle-{}-{}", pool, n));
            match builder.spawn_scoped(s, drain) {
                Ok(_) => spawned += 1,
                Err(e) => tracing::warn!(pool, error = %e, "could not start worker thread"),
            }
        }
        if spawned == 0 {
            drain();
        }
    });

    slots
        .into_inner()
        .unwrap_or_else(|e| e.into_inner())
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err("worker stopped before reaching this item".to_string())))
        .collect()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_plan_serializes_images_below_high_vram() {
        let settings = GenerationSettings::default();
        for tier in [HardwareTier::CpuOnly, HardwareTier::LowVram] {
            assert_eq!(SchedulePlan::for_host(tier, 8, &settings).image_workers, 1);
        }
        let plan = SchedulePlan::for_host(HardwareTier::HighVram, 8, &settings);
        assert_eq!(plan.image_workers, settings.max_image_workers);
        assert_eq!(plan.audio_workers, 8);
    }

    #[test]
    fn test_plan_respects_configured_audio_workers() {
        let settings = GenerationSettings {
            max_audio_workers: 3,
            ..GenerationSettings::default()
        };
        assert_eq!(SchedulePlan::for_host(HardwareTier::CpuOnly, 16, &settings).audio_workers, 3);
    }

    #[test]
    fn test_results_in_input_order() {
        let items: Vec<u64> = (0..20).collect();
        let results = run_bounded("test", &items, 4, |&i| {
            std::thread::sleep(Duration::from_millis(20 - i));
            i * 2
        });
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items = vec![(); 12];

        run_bounded("test", &items, 1, |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            active.fetch_sub(1, Ordering::SeqCst);
        });

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_is_contained_to_item() {
        let items = [1, 2, 3];
        let results = run_bounded("test", &items, 2, |&i| {
            if i == 2 {
                panic!("scene {} exploded", i);
            }
            i
        });
        assert_eq!(results[0], Ok(1));
        assert!(results[1].as_ref().unwrap_err().contains("scene 2 exploded"));
        assert_eq!(results[2], Ok(3));
    }

    #[test]
    fn test_empty_input() {
        let items: [u8; 0] = [];
        assert!(run_bounded("test", &items, 4, |&i| i).is_empty());
    }
}
