//! Runs internal requests on dedicated worker threads.
//!
//! The exchange itself is blocking I/O on a short-lived thread. Its result is
//! posted back to the event loop, where the completion callback runs and the
//! originating client request is released.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, error, warn};
use warden_telemetry::{register_thread, ThreadRegistration};

use super::address::AgentAddress;
use super::deadline::Deadline;
use super::error::InternalRequestError;
use super::parse::{parse_header_line, parse_status_line, HeaderLine};
use super::request::{CompletionCallback, InternalRequest, InternalResponse, ResponseStatus};
use super::stream::ResponseStream;
use crate::event_loop::LoopHandle;
use crate::host::{ClientRequest, RequestLease};

const WORKER_THREAD_NAME: &str = "Internal HTTP request";
const WORKER_STACK_SIZE: usize = 128 * 1024;
const MAX_LINE_BYTES: usize = 64 * 1024;
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

static PANIC_HOOK: Once = Once::new();

thread_local! {
    static RECORD_PANIC_TRACE: Cell<bool> = const { Cell::new(false) };
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

struct Job<R: ClientRequest> {
    request: InternalRequest,
    lease: RequestLease<R>,
    event_loop: LoopHandle,
}

/// Issue `request` from a background thread on behalf of `origin`.
///
/// `origin` is retained until the completion callback has run on the event
/// loop. If no worker thread can be started the callback still runs, with
/// [`ResponseStatus::Internal`].
pub fn submit_internal_request<R: ClientRequest>(
    event_loop: &LoopHandle,
    origin: &Arc<R>,
    request: InternalRequest,
) {
    let job = Job {
        request,
        lease: RequestLease::acquire(Arc::clone(origin)),
        event_loop: event_loop.clone(),
    };
    install_panic_hook();
    let slot = Arc::new(Mutex::new(Some(job)));
    let worker_slot = Arc::clone(&slot);

    let spawned = thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || {
            let job = worker_slot.lock().take();
            if let Some(job) = job {
                run_job(job);
            }
        });

    if let Err(err) = spawned {
        error!(error = %err, "Cannot start internal request thread");
        let job = slot.lock().take();
        if let Some(job) = job {
            let mut response = InternalResponse::new();
            response.fail(format!(
                "Cannot start a thread for the internal request to {}: {err}",
                job.request.address
            ));
            deliver(&job.event_loop, job.request.callback, response, job.lease);
        }
    }
}

fn run_job<R: ClientRequest>(job: Job<R>) {
    let Job {
        mut request,
        lease,
        event_loop,
    } = job;
    let registration = register_thread(WORKER_THREAD_NAME);
    let mut response = InternalResponse::new();
    RECORD_PANIC_TRACE.with(|record| record.set(true));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        perform(&mut request, &mut response, &registration)
    }));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => response.fail(format!(
            "Internal request to {} failed: {err}",
            request.address
        )),
        Err(payload) => {
            let mut message = format!(
                "Internal request to {} panicked: {}",
                request.address,
                panic_message(payload.as_ref())
            );
            if let Some(trace) = PANIC_TRACE.with(|slot| slot.borrow_mut().take()) {
                message.push_str(&format!("\nBacktrace:\n{trace}"));
            }
            response.fail(message);
        }
    }

    drop(registration);
    deliver(&event_loop, request.callback, response, lease);
}

fn perform(
    request: &mut InternalRequest,
    response: &mut InternalResponse,
    activity: &ThreadRegistration,
) -> Result<(), InternalRequestError> {
    let deadline = Deadline::after(request.timeout);

    activity.set_activity("connecting");
    let address: AgentAddress = request.address.parse()?;
    let mut stream = ResponseStream::new(address.connect(&deadline)?, deadline);

    activity.set_activity("sending request");
    stream.write_all(&request.encode_head())?;

    activity.set_activity("reading status line");
    let status_line = stream.read_line(MAX_LINE_BYTES)?;
    response.record_line(&status_line);
    let Some(code) = parse_status_line(&status_line) else {
        response.status = ResponseStatus::InvalidHeader;
        return Ok(());
    };

    activity.set_activity("reading headers");
    loop {
        let line = stream.read_line(MAX_LINE_BYTES)?;
        response.record_line(&line);
        match parse_header_line(&line) {
            HeaderLine::Header(name, value) => response.headers.insert(name, value),
            HeaderLine::EndOfHeaders => break,
            HeaderLine::Eof | HeaderLine::Malformed => {
                response.status = ResponseStatus::InvalidHeader;
                return Ok(());
            }
        }
    }
    response.status = ResponseStatus::Http(code);

    activity.set_activity("reading body");
    match request.body_processor.take() {
        Some(process) => process(response, &mut stream)?,
        None => match stream.read_to_end(MAX_BODY_BYTES) {
            Ok(body) => response.body = body,
            Err(InternalRequestError::BodyTooLarge(limit)) => {
                response.status = ResponseStatus::InvalidBody;
                response.append_error(format!("Response body larger than {limit} bytes"));
            }
            Err(err) => return Err(err),
        },
    }
    Ok(())
}

/// Post the completion to the loop.
///
/// Once the loop has shut down the completion can never run. The origin
/// request may only be released on the loop thread, so the lease is leaked
/// along with the rest of the completion.
fn deliver<R: ClientRequest>(
    event_loop: &LoopHandle,
    callback: CompletionCallback,
    response: InternalResponse,
    lease: RequestLease<R>,
) {
    if let Err(task) = event_loop.try_run_later(move || complete(callback, response, lease)) {
        warn!("Event loop has stopped; abandoning internal request result");
        mem::forget(task);
    }
}

fn complete<R: ClientRequest>(
    callback: CompletionCallback,
    response: InternalResponse,
    lease: RequestLease<R>,
) {
    for line in &response.debug_logs {
        debug!("{line}");
    }
    if !response.error_logs.is_empty() {
        error!("{}", response.error_logs.trim_end());
    }
    callback(response);
    drop(lease);
}

/// Chain a panic hook that keeps a backtrace of panics on worker threads,
/// for `run_job` to pick up after unwinding.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if RECORD_PANIC_TRACE.with(Cell::get) {
                let trace = Backtrace::force_capture();
                PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            }
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
