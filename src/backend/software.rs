//! Software JPEG encode backend
//!
//! A pure-Rust [`EncodeBackend`] built on the `image` crate. Jobs are run on
//! a dedicated encoder thread fed through a crossbeam channel, so completion
//! callbacks are always delivered from that thread and never from inside
//! [`EncodeBackend::start_job`].
//!
//! Semi-planar YUV sources (NV12/NV21/NV16/NV61 layouts) are converted to RGB
//! with BT.601 coefficients, cropped, scaled to the destination size, rotated
//! and encoded at the job's quality. The thumbnail source is not embedded in
//! the output bitstream.

use crate::backend::encoder::{
    EncodeBackend, EncodeCallback, EncodeEvent, EncodeImageSource, EncodeJobDescriptor,
    EncodeSessionConfig,
};
use crate::error::{PostProcError, Result};
use crate::pipeline::id::{ClientHandle, JobId, SessionId};
use crate::types::{Dimension, JpegColorFormat, PlaneLayout};
use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

enum EncoderMsg {
    Job(JobId, Box<EncodeJobDescriptor>),
    Shutdown,
}

struct Client {
    handle: ClientHandle,
    tx: Sender<EncoderMsg>,
    thread: JoinHandle<()>,
}

/// Jobs handed to the encoder thread and not yet completed
#[derive(Default)]
struct JobBook {
    in_flight: HashSet<JobId>,
    aborted: HashSet<JobId>,
}

impl JobBook {
    /// Drop `id` from the book; true when it was aborted
    fn finish(&mut self, id: JobId) -> bool {
        self.in_flight.remove(&id);
        self.aborted.remove(&id)
    }
}

type SharedBook = Arc<Mutex<JobBook>>;

fn lock_book(book: &SharedBook) -> std::sync::MutexGuard<'_, JobBook> {
    book.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct BackendState {
    client: Option<Client>,
    sessions: HashMap<SessionId, EncodeSessionConfig>,
}

/// JPEG encoder running on a background thread
pub struct SoftwareJpegBackend {
    state: Mutex<BackendState>,
    jobs: SharedBook,
    next_handle: AtomicU32,
}

impl Default for SoftwareJpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareJpegBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BackendState::default()),
            jobs: SharedBook::default(),
            next_handle: AtomicU32::new(1),
        }
    }

    fn allocate_handle(&self) -> u32 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn tracked_jobs(&self) -> (usize, usize) {
        let book = lock_book(&self.jobs);
        (book.in_flight.len(), book.aborted.len())
    }
}

impl EncodeBackend for SoftwareJpegBackend {
    fn open(&self, max_dim: Dimension, on_event: EncodeCallback) -> Result<ClientHandle> {
        let mut state = self.lock();
        if state.client.is_some() {
            return Err(PostProcError::backend("software encoder already open"));
        }

        let (tx, rx) = unbounded();
        let jobs = Arc::clone(&self.jobs);
        let thread = std::thread::Builder::new()
            .name("jpeg-encoder".into())
            .spawn(move || encoder_loop(rx, on_event, jobs))?;

        let handle = ClientHandle(self.allocate_handle());
        tracing::info!(
            "Software JPEG encoder opened ({}x{} max), {}",
            max_dim.width,
            max_dim.height,
            handle
        );
        state.client = Some(Client { handle, tx, thread });
        Ok(handle)
    }

    fn create_session(
        &self,
        client: ClientHandle,
        config: &EncodeSessionConfig,
    ) -> Result<SessionId> {
        let mut state = self.lock();
        match &state.client {
            Some(c) if c.handle == client => {}
            _ => return Err(PostProcError::backend(format!("unknown client {}", client))),
        }
        let session = SessionId(self.allocate_handle());
        state.sessions.insert(session, config.clone());
        tracing::debug!("Created encode session {}", session);
        Ok(session)
    }

    fn start_job(&self, job: EncodeJobDescriptor) -> Result<JobId> {
        let state = self.lock();
        if !state.sessions.contains_key(&job.session) {
            return Err(PostProcError::backend(format!(
                "unknown session {}",
                job.session
            )));
        }
        let client = state
            .client
            .as_ref()
            .ok_or_else(|| PostProcError::backend("encoder not open"))?;

        let id = JobId(self.allocate_handle());
        lock_book(&self.jobs).in_flight.insert(id);
        if client.tx.send(EncoderMsg::Job(id, Box::new(job))).is_err() {
            lock_book(&self.jobs).finish(id);
            return Err(PostProcError::backend("encoder thread gone"));
        }
        Ok(id)
    }

    fn abort_job(&self, job: JobId) -> Result<()> {
        let mut book = lock_book(&self.jobs);
        if book.in_flight.contains(&job) {
            book.aborted.insert(job);
        } else {
            tracing::debug!("Abort of {} after completion, ignoring", job);
        }
        Ok(())
    }

    fn destroy_session(&self, session: SessionId) -> Result<()> {
        self.lock()
            .sessions
            .remove(&session)
            .map(|_| ())
            .ok_or_else(|| PostProcError::backend(format!("unknown session {}", session)))
    }

    fn close(&self, client: ClientHandle) -> Result<()> {
        let taken = {
            let mut state = self.lock();
            match &state.client {
                Some(c) if c.handle == client => {
                    state.sessions.clear();
                    *lock_book(&self.jobs) = JobBook::default();
                    state.client.take()
                }
                _ => None,
            }
        };
        let client = taken
            .ok_or_else(|| PostProcError::backend(format!("unknown client {}", client)))?;

        let _ = client.tx.send(EncoderMsg::Shutdown);
        if client.thread.join().is_err() {
            tracing::error!("Encoder thread panicked");
        }
        tracing::info!("Software JPEG encoder closed");
        Ok(())
    }
}

fn encoder_loop(
    rx: Receiver<EncoderMsg>,
    on_event: EncodeCallback,
    jobs: SharedBook,
) {
    while let Ok(msg) = rx.recv() {
        let (id, job) = match msg {
            EncoderMsg::Job(id, job) => (id, job),
            EncoderMsg::Shutdown => break,
        };

        if lock_book(&jobs).aborted.contains(&id) {
            lock_book(&jobs).finish(id);
            tracing::debug!("Skipping aborted {}", id);
            continue;
        }

        let event = match encode_job(&job) {
            Ok(jpeg) => EncodeEvent::done(id, Bytes::from(jpeg)),
            Err(e) => {
                tracing::warn!("Encoding {} failed: {}", id, e);
                EncodeEvent::failed(id)
            }
        };

        // An abort may have landed while encoding
        if lock_book(&jobs).finish(id) {
            continue;
        }
        on_event(event);
    }
}

/// Encode the main image of a job into a JPEG bitstream
pub fn encode_job(job: &EncodeJobDescriptor) -> Result<Vec<u8>> {
    let rgb = source_to_rgb(&job.main)?;
    let rgb = if rgb.dimensions() == (job.main.dst_dim.width, job.main.dst_dim.height)
        || job.main.dst_dim.is_zero()
    {
        rgb
    } else {
        imageops::resize(
            &rgb,
            job.main.dst_dim.width,
            job.main.dst_dim.height,
            FilterType::Triangle,
        )
    };
    let rgb = match job.rotation % 360 {
        90 => imageops::rotate90(&rgb),
        180 => imageops::rotate180(&rgb),
        270 => imageops::rotate270(&rgb),
        _ => rgb,
    };

    let mut out = Vec::new();
    let quality = job.quality.clamp(1, 100) as u8;
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| PostProcError::backend(format!("JPEG encoding failed: {}", e)))?;
    Ok(out)
}

/// Convert the cropped region of a semi-planar YUV source to RGB (BT.601)
fn source_to_rgb(src: &EncodeImageSource) -> Result<RgbImage> {
    let crop = if src.crop.is_zero() {
        crate::types::CropRect::full(src.src_dim)
    } else {
        src.crop
    };
    if crop.left + crop.width > src.src_dim.width || crop.top + crop.height > src.src_dim.height {
        return Err(PostProcError::invalid("crop outside of source frame"));
    }

    let luma = plane_or_packed(src, 0);
    let chroma = plane_or_packed(src, 1);
    let chroma_base = luma.len as usize + chroma.offset as usize;
    let (cr_first, vertical_subsample) = match src.format {
        JpegColorFormat::CrCbH2V2 => (true, true),
        JpegColorFormat::CbCrH2V2 => (false, true),
        JpegColorFormat::CrCbH2V1 => (true, false),
        JpegColorFormat::CbCrH2V1 => (false, false),
    };

    let data = &src.data;
    let sample = |idx: usize| -> Result<f32> {
        data.get(idx)
            .map(|v| *v as f32)
            .ok_or_else(|| PostProcError::invalid("source buffer shorter than its layout"))
    };

    let mut img = RgbImage::new(crop.width, crop.height);
    for row in 0..crop.height {
        let y_row = (crop.top + row) as usize;
        let c_row = if vertical_subsample { y_row / 2 } else { y_row };
        for col in 0..crop.width {
            let x = (crop.left + col) as usize;
            let y = sample(luma.offset as usize + y_row * luma.stride as usize + x)?;
            let pair = chroma_base + c_row * chroma.stride as usize + (x & !1);
            let (first, second) = (sample(pair)? - 128.0, sample(pair + 1)? - 128.0);
            let (u, v) = if cr_first { (second, first) } else { (first, second) };

            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
            img.put_pixel(col, row, Rgb([r, g, b]));
        }
    }
    Ok(img)
}

fn plane_or_packed(src: &EncodeImageSource, index: usize) -> PlaneLayout {
    src.offset.planes.get(index).copied().unwrap_or(PlaneLayout {
        len: src.src_dim.width * src.src_dim.height,
        offset: 0,
        stride: src.src_dim.width,
        scanline: src.src_dim.height,
    })
}
