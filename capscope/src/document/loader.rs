//! Capture loading
//!
//! Everything here runs once per document, on a blocking worker when
//! reached through [`Document::open`]. The steps run in a fixed order
//! because later ones read what earlier ones built: mountinfo parsing
//! needs the host devices, symbol lookup later needs both the namespaces
//! and the address layouts.

use super::counters;
use super::{decode_at, CaptureData, Categories, CategoryIndex, Document, TimeSpan};
use crate::capture::{
    index_frames, sort_frames, ByteOrder, CaptureHeader, Frame, FrameIndexEntry, FrameType,
    Record,
};
use crate::domain::{CaptureError, DocumentError, Pid, Tid, Timestamp};
use crate::process::{MemoryMap, Mount, MountDevice, ProcessTable};
use crate::strings::StringPool;
use crate::symbols::AddressContext;
use log::{debug, info, warn};
use memmap2::Mmap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Everything the single classification pass produces
#[derive(Default)]
struct Classification {
    categories: Categories,
    pids: BTreeSet<Pid>,
    mark_groups: BTreeMap<String, BTreeMap<String, CategoryIndex>>,
    files: HashMap<String, u32>,
    guessed_end: Option<Timestamp>,
}

impl Document {
    /// Map and load the capture at `path` on a blocking worker
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or mapped, or is too
    /// short to hold a capture header.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, DocumentError> {
        Self::open_with_progress(path, |_, _| {}).await
    }

    /// Like [`open`](Self::open), reporting `(fraction, stage)` as loading
    /// advances
    ///
    /// # Errors
    /// See [`open`](Self::open).
    pub async fn open_with_progress<P, F>(path: P, progress: F) -> Result<Self, DocumentError>
    where
        P: AsRef<Path>,
        F: Fn(f64, &str) + Send + 'static,
    {
        let path: PathBuf = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || Self::open_blocking(&path, &progress))
            .await
            .map_err(|e| DocumentError::TaskFailed(e.to_string()))?
    }

    /// Synchronous form of [`open_with_progress`](Self::open_with_progress)
    ///
    /// # Errors
    /// See [`open`](Self::open).
    #[allow(unsafe_code)]
    pub fn open_blocking(path: &Path, progress: &dyn Fn(f64, &str)) -> Result<Self, DocumentError> {
        let open_error =
            |source| DocumentError::Open { path: path.display().to_string(), source };

        let file = File::open(path).map_err(open_error)?;
        // SAFETY: the mapping is read-only and the document never hands out
        // references that outlive it
        let map = unsafe { Mmap::map(&file) }.map_err(open_error)?;

        info!("Loading capture {} ({} bytes)", path.display(), map.len());
        Ok(Self::load(CaptureData::Mapped(map), progress)?)
    }

    /// Load a capture already held in memory
    ///
    /// # Errors
    /// Returns an error if `bytes` is too short to hold a capture header.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CaptureError> {
        Self::load(CaptureData::Owned(bytes), &|_, _| {})
    }

    /// Run every load step over `data`
    ///
    /// # Errors
    /// Returns an error if `data` is too short to hold a capture header.
    pub fn load(data: CaptureData, progress: &dyn Fn(f64, &str)) -> Result<Self, CaptureError> {
        progress(0.0, "Reading header");
        let header = CaptureHeader::parse(&data)?;
        let order = header.byte_order;

        progress(0.1, "Indexing capture data frames");
        let (mut frames, index_stop) = index_frames(&data, order);

        progress(0.4, "Sorting");
        sort_frames(&data, order, &mut frames);

        let strings = Arc::new(StringPool::new());
        let mut processes = ProcessTable::new(Arc::clone(&strings));

        progress(0.5, "Classifying");
        let classification = classify(&data, order, &frames, &mut processes);

        let mut time_span = TimeSpan { begin: header.time, end: header.end_time };
        if let Some(guessed) = classification.guessed_end.filter(|&end| end > time_span.begin) {
            time_span.end = guessed;
        }

        let mut document = Self {
            data,
            header,
            frames,
            index_stop,
            categories: classification.categories,
            pids: classification.pids,
            mark_groups: classification.mark_groups,
            files: classification.files,
            processes,
            counters: Vec::new(),
            cpus: Vec::new(),
            time_span,
            strings,
            symbols: OnceLock::new(),
        };

        progress(0.6, "Discovering host mounts");
        document.load_mounts();

        progress(0.65, "Parsing process mountinfo");
        document.load_mountinfos();
        document.load_cpus();

        progress(0.7, "Building address layouts");
        document.load_memory_maps();

        progress(0.75, "Resolving process identities");
        document.load_processes();

        progress(0.8, "Applying overlays");
        document.load_overlays();

        progress(0.85, "Reconstructing counters");
        document.counters = counters::reconstruct(
            &document.data,
            order,
            &document.frames,
            &document.categories,
            &document.strings,
        );

        document.finish_processes();
        progress(1.0, "Done");

        info!(
            "Loaded {} frames: {} samples, {} allocations, {} processes, {} counters",
            document.frames.len(),
            document.categories.samples.len(),
            document.categories.allocations.len(),
            document.processes.len(),
            document.counters.len()
        );
        Ok(document)
    }

    /// Contents of a captured text file, if present and readable
    fn read_text_file(&self, path: &str) -> Option<String> {
        let file = self.lookup_file(path)?;
        match file.read_to_string() {
            Ok(contents) => Some(contents),
            Err(e) => {
                warn!("Could not read {path} from capture: {e}");
                None
            }
        }
    }

    fn load_mounts(&mut self) {
        let Some(contents) = self.read_text_file("/proc/mounts") else {
            debug!("Capture has no /proc/mounts");
            return;
        };

        for line in contents.lines() {
            match MountDevice::parse_mounts_line(&self.strings, line) {
                Some(device) => self.processes.add_device(device),
                None => debug!("Skipping malformed mounts line: {line:?}"),
            }
        }
    }

    fn load_mountinfos(&mut self) {
        let pids: Vec<Pid> = self.pids.iter().copied().collect();

        for pid in pids {
            let Some(contents) = self.read_text_file(&format!("/proc/{}/mountinfo", pid.0))
            else {
                continue;
            };
            let strings = Arc::clone(&self.strings);
            let Some(info) = self.processes.process_info(pid, true) else {
                continue;
            };

            for line in contents.lines() {
                match Mount::parse_mountinfo(&strings, line) {
                    Some(mount) => info.mount_namespace.add_mount(mount),
                    None => debug!("Skipping short mountinfo line for {pid}: {line:?}"),
                }
            }
        }
    }

    fn load_memory_maps(&mut self) {
        let order = self.header.byte_order;

        for position in self.categories.memory_maps.iter() {
            let Some(frame) = decode_at(&self.data, &self.frames, order, position) else {
                continue;
            };
            let Record::Map(map) = &frame.record else { continue };
            let map = MemoryMap {
                start: map.start,
                end: map.end,
                offset: map.offset,
                inode: map.inode,
                file: self.strings.intern(&map.file),
                time: frame.time(),
            };
            if let Some(info) = self.processes.process_info(frame.pid(), true) {
                info.address_layout.add(map);
            }
        }
    }

    /// Name processes from their command lines and drop repeated records
    ///
    /// Later process records for a pid only refresh its name, so they are
    /// removed from the processes category.
    fn load_processes(&mut self) {
        let order = self.header.byte_order;
        let mut seen = BTreeSet::new();
        let mut duplicates = CategoryIndex::new();

        self.processes.process_info(Pid::KERNEL, true);

        for position in self.categories.processes.iter() {
            let Some(frame) = decode_at(&self.data, &self.frames, order, position) else {
                continue;
            };
            let Record::Process(process) = &frame.record else { continue };
            let pid = frame.pid();

            if let Some(info) = self.processes.process_info(pid, true) {
                info.set_command_line(&self.strings, &process.command_line);
            }
            if !seen.insert(pid) {
                duplicates.push(position);
            }
        }

        if !duplicates.is_empty() {
            debug!("Dropping {} repeated process records", duplicates.len());
            self.categories.processes = self.categories.processes.subtract(&duplicates);
        }
    }

    fn load_overlays(&mut self) {
        let order = self.header.byte_order;

        for position in self.categories.overlays.iter() {
            let Some(frame) = decode_at(&self.data, &self.frames, order, position) else {
                continue;
            };
            let Record::Overlay(overlay) = &frame.record else { continue };
            let mount =
                Mount::overlay(&self.strings, overlay.layer, &overlay.source, &overlay.destination);
            if let Some(info) = self.processes.process_info(frame.pid(), true) {
                info.mount_namespace.add_mount(mount);
            }
        }
    }

    /// Default missing exit times and put per-process lookups in order
    fn finish_processes(&mut self) {
        let end = self.time_span.end;
        for info in self.processes.iter_mut() {
            if info.exit_time == Timestamp(0) {
                info.exit_time = end;
            }
            info.mount_namespace.sort();
            info.address_layout.sort();
        }
    }
}

/// Single pass over the sorted index filling every category
fn classify(
    data: &[u8],
    order: ByteOrder,
    frames: &[FrameIndexEntry],
    processes: &mut ProcessTable,
) -> Classification {
    let mut out = Classification::default();
    let mut guessed_end: Option<Timestamp> = None;
    let mut extend_end = |time: Timestamp| {
        if guessed_end.map_or(true, |end| time > end) {
            guessed_end = Some(time);
        }
    };

    for (position, entry) in frames.iter().enumerate() {
        let Ok(position) = u32::try_from(position) else {
            warn!("Capture has more frames than can be indexed, ignoring the rest");
            break;
        };
        let Some(frame) = entry.slice(data).and_then(|bytes| Frame::decode(bytes, order)) else {
            continue;
        };
        let (pid, time) = (frame.pid(), frame.time());

        if pid.is_valid() {
            out.pids.insert(pid);
        }
        if frame.frame_type().is_some_and(FrameType::carries_state) {
            extend_end(time);
        }

        let categories = &mut out.categories;
        match &frame.record {
            Record::Sample(sample) => {
                categories.samples.push(position);
                categories.traceables.push(position);
                let enters_kernel = sample.addresses.iter().any(|address| {
                    AddressContext::from_sentinel(address) == Some(AddressContext::Kernel)
                });
                if enters_kernel {
                    categories.samples_with_context_switch.push(position);
                }
                if let Some(info) = processes.process_info(pid, true) {
                    if sample.tid != Tid(pid.0) {
                        info.add_thread(sample.tid);
                    }
                }
            }
            Record::Allocation(allocation) => {
                categories.allocations.push(position);
                categories.traceables.push(position);
                if let Some(info) = processes.process_info(pid, true) {
                    info.add_thread(allocation.tid);
                }
            }
            Record::Process(_) => categories.processes.push(position),
            Record::Map(_) => categories.memory_maps.push(position),
            Record::CounterDefine(_) => categories.counter_definitions.push(position),
            Record::CounterSet(_) => categories.counter_sets.push(position),
            Record::Jitmap(_) => categories.jitmaps.push(position),
            Record::Overlay(_) => categories.overlays.push(position),
            Record::Fork { .. } => categories.forks.push(position),
            Record::Log(_) => categories.logs.push(position),
            Record::Metadata(_) => categories.metadata.push(position),
            Record::Exit => {
                categories.exits.push(position);
                if let Some(info) = processes.process_info(pid, true) {
                    info.exit_time = time;
                }
            }
            Record::Mark(mark) => {
                categories.marks.push(position);
                extend_end(Timestamp(time.0.saturating_add(mark.duration)));
                out.mark_groups
                    .entry(mark.group.to_string())
                    .or_default()
                    .entry(mark.name.to_string())
                    .or_default()
                    .push(position);
            }
            Record::FileChunk(chunk) => {
                categories.file_chunks.push(position);
                if chunk.path_terminated && !out.files.contains_key(chunk.path.as_ref()) {
                    out.files.insert(chunk.path.to_string(), position);
                }
            }
            Record::Timestamp => {}
            Record::Unknown(tag) => {
                debug!("Frame {position} has unknown type {tag}");
                categories.unknown.push(position);
            }
        }
    }

    out.guessed_end = guessed_end;
    out
}
