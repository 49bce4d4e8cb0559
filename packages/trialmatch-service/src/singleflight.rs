use std::{
	collections::HashSet,
	sync::{Arc, Mutex},
};

use uuid::Uuid;

use crate::{Error, Result};

/// In-process guard ensuring at most one active matching run per patient.
/// The per-patient advisory lock inside the replace transaction backstops
/// this across processes.
#[derive(Clone, Default)]
pub struct SingleFlight {
	active: Arc<Mutex<HashSet<Uuid>>>,
}
impl SingleFlight {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fails fast with `MatchingInProgress` when a run already holds the
	/// patient. The permit releases on drop.
	pub fn acquire(&self, patient_id: Uuid) -> Result<RunPermit> {
		let mut active = self.active.lock().unwrap_or_else(|err| err.into_inner());

		if !active.insert(patient_id) {
			return Err(Error::MatchingInProgress { patient_id });
		}

		Ok(RunPermit { active: Arc::clone(&self.active), patient_id })
	}
}

pub struct RunPermit {
	active: Arc<Mutex<HashSet<Uuid>>>,
	patient_id: Uuid,
}
impl Drop for RunPermit {
	fn drop(&mut self) {
		let mut active = self.active.lock().unwrap_or_else(|err| err.into_inner());

		active.remove(&self.patient_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn second_acquire_for_the_same_patient_fails_fast() {
		let guard = SingleFlight::new();
		let patient_id = Uuid::new_v4();
		let permit = guard.acquire(patient_id).expect("First acquire must succeed.");
		let second = guard.acquire(patient_id);

		assert!(matches!(second, Err(Error::MatchingInProgress { .. })));
		drop(permit);
	}

	#[test]
	fn dropping_the_permit_releases_the_patient() {
		let guard = SingleFlight::new();
		let patient_id = Uuid::new_v4();

		drop(guard.acquire(patient_id).expect("First acquire must succeed."));

		assert!(guard.acquire(patient_id).is_ok());
	}

	#[test]
	fn distinct_patients_do_not_contend() {
		let guard = SingleFlight::new();
		let first = guard.acquire(Uuid::new_v4()).expect("First acquire must succeed.");
		let second = guard.acquire(Uuid::new_v4());

		assert!(second.is_ok());
		drop(first);
	}
}
