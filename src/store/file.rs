//! File-backed [`TokenStore`] for single-host deployments.

// std
use std::{
	ffi::OsString,
	fs::{self, File, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use fs4::fs_std::FileExt;
use tempfile::NamedTempFile;
// self
use crate::{
	_prelude::*,
	auth::{PartitionKey, TokenRecord, TokenSecret},
	store::{LockOutcome, LockRequest, StoreError, StoreFuture, TokenStore},
};

type Snapshot = BTreeMap<PartitionKey, TokenRecord>;

/// Persists records to a JSON file, replacing it atomically after each mutation.
///
/// Every operation holds an exclusive advisory lock on `<file>.lock` while it reloads, checks,
/// and rewrites the table, so `try_lock` is a conditional write between handles and processes
/// sharing the path. Writes go through a uniquely named temporary file in the same directory.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	lock_path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;
		let mut lock_path = OsString::from(path.as_os_str());

		lock_path.push(".lock");

		Ok(Self { path, lock_path: lock_path.into(), inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Opens `<dir>/<table>.json`, mirroring a table name from deployment settings.
	pub fn open_table(dir: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
		Self::open(dir.as_ref().join(format!("{table}.json")))
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Location of the advisory lock file guarding [`Self::path`].
	pub fn lock_path(&self) -> &Path {
		&self.lock_path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(Snapshot::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	/// Opens the lock file and blocks until this handle holds it exclusively.
	///
	/// The lock is released when the returned file is dropped.
	fn acquire_file_lock(&self) -> Result<File, StoreError> {
		Self::ensure_parent_exists(&self.lock_path)?;

		let file = OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(&self.lock_path)
			.map_err(|e| StoreError::Backend {
				message: format!("Failed to open {}: {e}", self.lock_path.display()),
			})?;

		FileExt::lock_exclusive(&file).map_err(|e| StoreError::Backend {
			message: format!("Failed to lock {}: {e}", self.lock_path.display()),
		})?;

		Ok(file)
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let dir =
			self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
		let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::Backend {
			message: format!("Failed to create a temporary file in {}: {e}", dir.display()),
		})?;

		tmp.write_all(&serialized).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", tmp.path().display()),
		})?;
		tmp.as_file().sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", tmp.path().display()),
		})?;
		tmp.persist(&self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {}", self.path.display(), e.error),
		})?;

		Ok(())
	}

	/// Reloads the file under both locks, applies `mutate`, and persists when it changed
	/// something.
	fn update<T>(&self, mutate: impl FnOnce(&mut Snapshot) -> (T, bool)) -> Result<T, StoreError> {
		let mut guard = self.inner.write();
		let _file_lock = self.acquire_file_lock()?;

		*guard = Self::load_snapshot(&self.path)?;

		let (value, dirty) = mutate(&mut guard);

		if dirty {
			self.persist_locked(&guard)?;
		}

		Ok(value)
	}
}
impl TokenStore for FileStore {
	fn get<'a>(&'a self, key: &'a PartitionKey) -> StoreFuture<'a, TokenRecord> {
		Box::pin(async move {
			self.update(|snapshot| (snapshot.get(key).cloned().unwrap_or_default(), false))
		})
	}

	fn try_lock<'a>(
		&'a self,
		key: &'a PartitionKey,
		request: LockRequest,
	) -> StoreFuture<'a, LockOutcome> {
		Box::pin(async move {
			self.update(|snapshot| {
				if !request.permits(snapshot.get(key)) {
					return (LockOutcome::Contended, false);
				}

				snapshot.entry(key.to_owned()).or_default().lock(request.requested_at);

				(LockOutcome::Acquired, true)
			})
		})
	}

	fn save<'a>(
		&'a self,
		key: &'a PartitionKey,
		token: &'a TokenSecret,
		expires_at: OffsetDateTime,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.update(|snapshot| {
				snapshot.insert(key.to_owned(), TokenRecord::issued(token.to_owned(), expires_at));

				((), true)
			})
		})
	}

	fn unlock<'a>(&'a self, key: &'a PartitionKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.update(|snapshot| match snapshot.get_mut(key) {
				Some(record) => {
					record.unlock();

					((), true)
				},
				None => ((), false),
			})
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process, sync::Barrier, thread};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"token_broker_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn key() -> PartitionKey {
		PartitionKey::new("file-app#test").expect("Failed to build partition key fixture.")
	}

	fn remove_store_files(store: &FileStore) {
		for path in [store.path(), store.lock_path()] {
			fs::remove_file(path).unwrap_or_else(|e| {
				panic!("Failed to remove temporary store file {}: {e}", path.display())
			});
		}
	}

	#[test]
	fn save_and_reload_round_trip() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");
		let expires_at = OffsetDateTime::from_unix_timestamp(1_900_000_000)
			.expect("Fixture timestamp should be valid.");

		rt.block_on(store.save(&key(), &TokenSecret::new("file-token"), expires_at))
			.expect("Failed to save fixture token to file store.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched =
			rt.block_on(reopened.get(&key())).expect("Failed to read record from file store.");

		assert_eq!(fetched.token.expose(), "file-token");
		assert_eq!(fetched.expires_at, Some(expires_at));
		assert!(!fetched.refreshing);

		remove_store_files(&reopened);
	}

	#[test]
	fn lock_is_visible_to_a_second_handle() {
		let path = temp_path();
		let first = FileStore::open(&path).expect("Failed to open first file store handle.");
		let second = FileStore::open(&path).expect("Failed to open second file store handle.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		assert_eq!(
			rt.block_on(first.try_lock(&key(), LockRequest::now()))
				.expect("First lock attempt should not fail."),
			LockOutcome::Acquired
		);
		assert_eq!(
			rt.block_on(second.try_lock(&key(), LockRequest::now()))
				.expect("Second lock attempt should not fail."),
			LockOutcome::Contended
		);

		rt.block_on(first.unlock(&key())).expect("Unlock should succeed.");

		assert_eq!(
			rt.block_on(second.try_lock(&key(), LockRequest::now()))
				.expect("Lock attempt after unlock should not fail."),
			LockOutcome::Acquired
		);

		remove_store_files(&first);
	}

	#[test]
	fn racing_handles_see_contention_not_errors() {
		const ROUNDS: usize = 200;

		let path = temp_path();
		let handles = [
			FileStore::open(&path).expect("Failed to open first file store handle."),
			FileStore::open(&path).expect("Failed to open second file store handle."),
		];
		let barrier = Barrier::new(handles.len());
		let outcomes = thread::scope(|scope| {
			let workers = handles
				.iter()
				.map(|store| {
					let barrier = &barrier;

					scope.spawn(move || {
						let rt = Runtime::new().expect("Failed to build Tokio runtime for worker.");

						(0..ROUNDS)
							.map(|_| {
								barrier.wait();

								let outcome = rt
									.block_on(store.try_lock(&key(), LockRequest::now()))
									.expect("Racing lock attempt should not fail.");

								barrier.wait();

								if outcome == LockOutcome::Acquired {
									rt.block_on(store.unlock(&key()))
										.expect("Unlock after a won race should succeed.");
								}

								barrier.wait();

								outcome
							})
							.collect::<Vec<_>>()
					})
				})
				.collect::<Vec<_>>();

			workers
				.into_iter()
				.map(|worker| worker.join().expect("Lock worker should not panic."))
				.collect::<Vec<_>>()
		});

		for round in 0..ROUNDS {
			let winners = outcomes
				.iter()
				.filter(|outcomes| outcomes[round] == LockOutcome::Acquired)
				.count();

			assert_eq!(winners, 1, "Round {round} should have exactly one lock holder.");
		}

		remove_store_files(&handles[0]);
	}

	#[test]
	fn open_table_uses_json_extension() {
		let dir = env::temp_dir();
		let store =
			FileStore::open_table(&dir, "SfAuthToken").expect("Failed to open table file store.");

		assert_eq!(store.path(), dir.join("SfAuthToken.json"));
	}
}
