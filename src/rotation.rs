//! Shifting numbered backup generations on the remote store
//!
//! Generations live in `<remote_root>/<prefix>.<n>`, slot 0 being the newest.
//! A rotation evicts slot `retain`, then renames every occupied slot `i` to
//! `i + 1`, highest first, so no rename ever targets a slot that is still
//! occupied. All renames go out as one `&&` chained remote command.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::remote::{RemoteCommand, RemoteExecutor};

/// Remote operations of one rotation, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPlan {
	/// Slot removed before shifting
	pub evict: Option<u32>,

	/// `(from, to)` renames, highest slot first
	pub shifts: Vec<(u32, u32)>,

	/// Newest surviving prior generation after the shift
	pub last_found: Option<u32>,
}

/// Compute the rotation for the occupied slots `occupied`.
///
/// Slots above `retain` are ignored.
pub fn plan_rotation(occupied: &BTreeSet<u32>, retain: u32) -> RotationPlan {
	let evict = if occupied.contains(&retain) { Some(retain) } else { None };

	let mut shifts = Vec::new();
	let mut last_found = None;
	for slot in (0..retain).rev() {
		if !occupied.contains(&slot) {
			continue;
		}
		shifts.push((slot, slot + 1));
		last_found = Some(slot + 1);
	}

	RotationPlan { evict, shifts, last_found }
}

/// Parse `ls -1` output into the set of occupied slot numbers
pub fn parse_slots(listing: &str, prefix: &str) -> BTreeSet<u32> {
	listing
		.lines()
		.filter_map(|name| {
			let suffix = name.trim().strip_prefix(prefix)?.strip_prefix('.')?;
			let slot: u32 = suffix.parse().ok()?;
			// Only the canonical spelling is a slot; "v.01" is not slot 1
			if slot.to_string() == suffix {
				Some(slot)
			} else {
				None
			}
		})
		.collect()
}

/// Lowest occupied slot >= 1, the dedup reference when resuming
pub fn reference_slot(occupied: &BTreeSet<u32>) -> Option<u32> {
	occupied.range(1..).next().copied()
}

pub struct RotationManager<'a, E: RemoteExecutor> {
	executor: &'a E,
}

impl<'a, E: RemoteExecutor> RotationManager<'a, E> {
	pub fn new(executor: &'a E) -> Self {
		RotationManager { executor }
	}

	/// `mkdir -p` the remote root
	pub async fn ensure_root(&self, remote_root: &Path) -> Result<(), TransportError> {
		self.executor.run(&RemoteCommand::mkdir_p(remote_root)).await?;
		Ok(())
	}

	/// Occupied slots under `remote_root`, one remote round trip
	pub async fn list_slots(
		&self,
		remote_root: &Path,
		prefix: &str,
	) -> Result<BTreeSet<u32>, TransportError> {
		let listing = self.executor.run(&RemoteCommand::list(remote_root)).await?;
		let slots = parse_slots(&listing, prefix);
		debug!("Occupied slots in {}: {:?}", remote_root.display(), slots);
		Ok(slots)
	}

	/// Evict and shift generations, vacating slot 0.
	///
	/// Returns the slot now holding the newest prior generation. A failure
	/// leaves the remote slots in an unknown state; it is not retried.
	pub async fn rotate(
		&self,
		remote_root: &Path,
		prefix: &str,
		retain: u32,
	) -> Result<Option<u32>, TransportError> {
		info!("Rotate {}/{}.*", remote_root.display(), prefix);
		let occupied = self.list_slots(remote_root, prefix).await?;

		let orphans: Vec<u32> = occupied.range(retain.saturating_add(1)..).copied().collect();
		if !orphans.is_empty() {
			warn!(
				"Slots {:?} of {} are beyond the retention count {} and are left untouched",
				orphans,
				prefix,
				retain
			);
		}

		let plan = plan_rotation(&occupied, retain);
		let path_of = |slot: u32| slot_path(remote_root, prefix, slot);

		if let Some(slot) = plan.evict {
			info!("Evict {}", path_of(slot).display());
			self.executor.run(&RemoteCommand::remove_tree(&path_of(slot))).await?;
		}

		let chain = plan.shifts.iter().fold(None, |chain: Option<RemoteCommand>, &(from, to)| {
			let mv = RemoteCommand::rename(&path_of(from), &path_of(to));
			Some(match chain {
				Some(chain) => chain.and_then(mv),
				None => mv,
			})
		});
		if let Some(chain) = chain {
			debug!("Shift {} generations", plan.shifts.len());
			self.executor.run(&chain).await?;
		}

		Ok(plan.last_found)
	}

	/// Read-only lookup of the dedup reference for a resumed attempt
	pub async fn find_reference(
		&self,
		remote_root: &Path,
		prefix: &str,
	) -> Result<Option<u32>, TransportError> {
		let occupied = self.list_slots(remote_root, prefix).await?;
		Ok(reference_slot(&occupied))
	}
}

fn slot_path(remote_root: &Path, prefix: &str, slot: u32) -> PathBuf {
	remote_root.join(format!("{}.{}", prefix, slot))
}


// vim: ts=4
