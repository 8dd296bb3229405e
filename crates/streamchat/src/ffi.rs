//! C bindings for the library.
//!
//! All functions are safe to call from any thread. Callbacks are invoked
//! on the library's own worker threads.

use std::ffi::{CStr, c_char, c_void};
use std::ops::Deref;
use std::ptr;
use std::sync::{Arc, LazyLock};

use streamchat_core::{SendError, SessionError};
use streamchat_model::{ConversationHistory, ErrorKind, StreamState};
use streamchat_openai_transport::OpenAIConfigBuilder;
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};

use crate::chat::messages_json;
use crate::{Chat, ChatBuilder};

static TOKIO_RUNTIME: LazyLock<Option<Runtime>> = LazyLock::new(|| {
    RuntimeBuilder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("streamchat")
        .build()
        .inspect_err(|err| error!("failed to start the runtime: {err}"))
        .ok()
});

/// Error codes returned by the C APIs.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// No error occurred.
    Ok = 0,
    /// Invalid parameters or strings.
    Invalid = 1,
    /// The message is empty.
    EmptyInput = 2,
    /// The library could not initialize its runtime or HTTP client.
    Internal = 3,
}

/// How a session ended, as reported to `on_session_finished`.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The reply was received completely.
    Done = 0,
    /// The reply was cancelled.
    Aborted = 1,
    /// The request could not be delivered, or the connection broke.
    Network = 2,
    /// The server answered with a non-success status.
    HttpStatus = 3,
    /// The response has no readable body.
    EmptyBody = 4,
    /// The stream stalled for longer than the idle timeout.
    IdleTimeout = 5,
    /// The response headers did not arrive in time.
    RequestTimeout = 6,
    /// The endpoint reported an error inside the stream.
    Upstream = 7,
    /// Any other errors.
    Other = 8,
}

impl From<ErrorKind> for SessionOutcome {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Network => SessionOutcome::Network,
            ErrorKind::HttpStatus => SessionOutcome::HttpStatus,
            ErrorKind::EmptyBody => SessionOutcome::EmptyBody,
            ErrorKind::IdleTimeout => SessionOutcome::IdleTimeout,
            ErrorKind::RequestTimeout => SessionOutcome::RequestTimeout,
            ErrorKind::Upstream => SessionOutcome::Upstream,
            ErrorKind::Other => SessionOutcome::Other,
        }
    }
}

/// Returns the outcome of a joined session and its HTTP status, or 0 if
/// there is none.
fn session_outcome(
    result: &Result<StreamState, SessionError>,
) -> (SessionOutcome, u16) {
    match result {
        Ok(StreamState::Aborted) => (SessionOutcome::Aborted, 0),
        Ok(StreamState::Failed(kind)) => ((*kind).into(), 0),
        Ok(_) => (SessionOutcome::Done, 0),
        Err(err) => (err.kind().into(), err.status().unwrap_or(0)),
    }
}

type FinishedCallback = Arc<dyn Fn(SessionOutcome, u16) + Send + Sync>;

/// A wrapper around `ChatBuilder`, whose methods consume `self`. Exposed to
/// C it lives in a box, so the builder is moved out, changed, and put back.
struct ChatBuilderWrapper {
    builder: Option<ChatBuilder>,
    on_session_finished: Option<FinishedCallback>,
}

/// The chat handed out to C, along with the callback that has to be
/// attached to every session it starts.
struct ChatWrapper {
    chat: Chat,
    on_session_finished: Option<FinishedCallback>,
}

/// Callbacks for chat events.
///
/// Note that callback functions and `user_info` are assumed to be thread-safe
/// and able to send across the thread boundaries. Callbacks must not call
/// back into the chat they are attached to.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ChatCallbacks {
    /// User-defined data to be passed to the callbacks.
    pub user_info: *mut c_void,
    /// Callback to handle changes of the message list.
    ///
    /// Parameters:
    /// - `user_info`: The user-defined data.
    /// - `messages`: JSON array of `{id, role, content}` objects, not nul
    ///   terminated. Only valid during the call.
    /// - `messages_len`: Length of the JSON string.
    pub on_messages_changed:
        Option<unsafe extern "C" fn(*mut c_void, *const c_char, usize)>,
    /// Callback to handle the streaming indicator.
    ///
    /// Parameters:
    /// - `user_info`: The user-defined data.
    /// - `streaming`: Whether a reply is being awaited or streamed.
    pub on_streaming_changed: Option<unsafe extern "C" fn(*mut c_void, bool)>,
    /// Callback to handle the end of a session started by `sc_chat_send`.
    ///
    /// Parameters:
    /// - `user_info`: The user-defined data.
    /// - `outcome`: How the session ended.
    /// - `status`: The HTTP status of a failed request, or 0.
    pub on_session_finished:
        Option<unsafe extern "C" fn(*mut c_void, SessionOutcome, u16)>,
    /// Callback to free the user-defined data.
    pub free: Option<unsafe extern "C" fn(*mut c_void)>,
}

// SAFETY: `ChatCallbacks` is guaranteed to be thread-safe by users.
unsafe impl Send for ChatCallbacks {}
unsafe impl Sync for ChatCallbacks {}

/// Reads an optional string argument. Null and empty strings are `None`.
///
/// # Safety
///
/// `ptr` must be null or point to a nul-terminated string.
unsafe fn opt_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, ErrorCode> {
    if ptr.is_null() {
        return Ok(None);
    }
    // SAFETY: Checked for null above, the rest is up to the caller.
    match unsafe { CStr::from_ptr(ptr) }.to_str() {
        Ok("") => Ok(None),
        Ok(s) => Ok(Some(s)),
        Err(_) => Err(ErrorCode::Invalid),
    }
}

/// Creates a chat builder for an OpenAI-compatible endpoint.
///
/// `out` will be set to a pointer to the chat builder if the call succeeds.
/// Any of the strings may be null, in which case no API key is sent, the
/// default base URL is used, or the default model is used.
///
/// The caller must either free the builder or use it to create a chat, or
/// the resources will be leaked.
///
/// # Safety
///
/// Non-null strings passed to this function must contain a valid nul
/// terminator at the end of the string. `out` must be a valid pointer that
/// points to a pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sc_chat_builder_new_openai(
    out: *mut *mut c_void,
    api_key: *const c_char,
    base_url: *const c_char,
    model: *const c_char,
) -> ErrorCode {
    // SAFETY: Assume the caller has provided the valid pointers.
    let args = unsafe { (opt_str(api_key), opt_str(base_url), opt_str(model)) };
    let (Ok(api_key), Ok(base_url), Ok(model)) = args else {
        return ErrorCode::Invalid;
    };

    let mut config = match api_key {
        Some(api_key) => OpenAIConfigBuilder::with_api_key(api_key),
        None => OpenAIConfigBuilder::without_api_key(),
    };
    if let Some(base_url) = base_url {
        config = config.with_base_url(base_url);
    }
    let mut builder = match ChatBuilder::with_openai(config.build()) {
        Ok(builder) => builder,
        Err(err) => {
            error!("{err}");
            return ErrorCode::Internal;
        }
    };
    if let Some(model) = model {
        builder = builder.with_model(model);
    }

    let builder_wrapper_ptr = Box::into_raw(Box::new(ChatBuilderWrapper {
        builder: Some(builder),
        on_session_finished: None,
    }));
    // SAFETY: Assume `out` is valid and properly aligned.
    unsafe {
        (out as *mut *mut ChatBuilderWrapper).write(builder_wrapper_ptr);
    }

    ErrorCode::Ok
}

/// Sets the system prompt of the chat.
///
/// # Safety
///
/// `builder` must be a valid pointer returned from the creation functions of
/// chat builder. `prompt` must be null or contain a valid nul terminator.
/// A null `prompt` is rejected with `Invalid`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sc_chat_builder_set_system_prompt(
    builder: *mut c_void,
    prompt: *const c_char,
) -> ErrorCode {
    if prompt.is_null() {
        return ErrorCode::Invalid;
    }
    // SAFETY: Checked for null above, and the caller guarantees the
    // terminator.
    let Ok(prompt) = unsafe { CStr::from_ptr(prompt) }.to_str() else {
        return ErrorCode::Invalid;
    };

    // SAFETY: Assume the caller has provided the valid pointer.
    let builder_wrapper = unsafe { &mut *(builder as *mut ChatBuilderWrapper) };
    builder_wrapper.builder = builder_wrapper
        .builder
        .take()
        .map(|builder| builder.with_system_prompt(prompt));

    ErrorCode::Ok
}

/// Sets the callbacks for the chat builder.
///
/// # Safety
///
/// `builder` must be a valid pointer returned from the creation functions of
/// chat builder. `callbacks` must be a valid pointer to `ChatCallbacks`
/// value, and all fields must be either valid pointers or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sc_chat_builder_set_callbacks(
    builder: *mut c_void,
    callbacks: *const ChatCallbacks,
) {
    /// Adds reference-counting for the user info, so it can be freed when
    /// both callbacks are gone.
    struct Wrapper {
        callbacks: ChatCallbacks,
    }

    impl Deref for Wrapper {
        type Target = ChatCallbacks;

        fn deref(&self) -> &Self::Target {
            &self.callbacks
        }
    }

    impl Drop for Wrapper {
        fn drop(&mut self) {
            if let Some(free) = self.callbacks.free {
                // SAFETY: Assume the callback is valid.
                unsafe { free(self.callbacks.user_info) };
            }
        }
    }

    // SAFETY: Assume the callback is valid.
    let callbacks = unsafe { *callbacks };
    let wrapper = Arc::new(Wrapper { callbacks });

    // SAFETY: Assume the caller has provided the valid pointer.
    let builder_wrapper = unsafe { &mut *(builder as *mut ChatBuilderWrapper) };
    let Some(mut builder) = builder_wrapper.builder.take() else {
        return;
    };
    if let Some(on_messages_changed) = callbacks.on_messages_changed {
        builder = builder.on_messages_changed({
            let wrapper = Arc::clone(&wrapper);
            move |history: &ConversationHistory| {
                let json = messages_json(history);
                // SAFETY: Assume the callback is valid.
                unsafe {
                    on_messages_changed(
                        wrapper.user_info,
                        json.as_ptr() as *const _,
                        json.len(),
                    )
                };
            }
        });
    }
    if let Some(on_streaming_changed) = callbacks.on_streaming_changed {
        builder = builder.on_streaming_changed({
            let wrapper = Arc::clone(&wrapper);
            move |streaming: bool| {
                // SAFETY: Assume the callback is valid.
                unsafe { on_streaming_changed(wrapper.user_info, streaming) };
            }
        });
    }
    if let Some(on_session_finished) = callbacks.on_session_finished {
        let wrapper = Arc::clone(&wrapper);
        builder_wrapper.on_session_finished =
            Some(Arc::new(move |outcome: SessionOutcome, status: u16| {
                // SAFETY: Assume the callback is valid.
                unsafe {
                    on_session_finished(wrapper.user_info, outcome, status)
                };
            }));
    }
    builder_wrapper.builder = Some(builder);
}

/// Frees a previously initialized chat builder.
///
/// # Safety
///
/// `builder` must be a valid pointer returned from the creation functions of
/// chat builder.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sc_chat_builder_free(builder: *mut c_void) {
    // SAFETY: Assume the caller has provided the valid pointer.
    unsafe {
        let builder_wrapper_ptr = builder as *mut ChatBuilderWrapper;
        drop(Box::from_raw(builder_wrapper_ptr));
    }
}

/// Builds a chat from a previously initialized chat builder.
///
/// Note that the chat builder is consumed and cannot be used again after
/// this call. Returns null if the builder has been used up already.
///
/// # Safety
///
/// `builder` must be a valid pointer returned from the creation functions of
/// chat builder.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sc_chat_builder_build(
    builder: *mut c_void,
) -> *mut c_void {
    // SAFETY: Assume the caller has provided the valid pointer.
    let mut builder_wrapper = unsafe {
        let builder_wrapper_ptr = builder as *mut ChatBuilderWrapper;
        Box::from_raw(builder_wrapper_ptr)
    };
    let Some(builder) = builder_wrapper.builder.take() else {
        return ptr::null_mut();
    };
    let chat_ptr = Box::into_raw(Box::new(ChatWrapper {
        chat: builder.build(),
        on_session_finished: builder_wrapper.on_session_finished.take(),
    }));
    chat_ptr as _
}

/// Sends a message and starts streaming the reply.
///
/// The user message and an empty assistant message are added before this
/// returns. A reply that is still streaming is cancelled. The session goes
/// on in the background, and reports through the callbacks, ending with
/// `on_session_finished`.
///
/// # Safety
///
/// `chat` must be a valid pointer returned from `sc_chat_builder_build`.
/// `message` must be null or contain a valid nul terminator at the end of
/// the string. A null `message` is rejected with `Invalid`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sc_chat_send(
    chat: *mut c_void,
    message: *const c_char,
) -> ErrorCode {
    if message.is_null() {
        return ErrorCode::Invalid;
    }
    // SAFETY: Checked for null above, and the caller guarantees the
    // terminator.
    let Ok(message) = unsafe { CStr::from_ptr(message) }.to_str() else {
        return ErrorCode::Invalid;
    };
    // Sessions are spawned onto the runtime.
    let Some(runtime) = &*TOKIO_RUNTIME else {
        return ErrorCode::Internal;
    };
    let _enter = runtime.enter();

    // SAFETY: Assume the caller has provided the valid pointer.
    let chat_wrapper = unsafe { &*(chat as *mut ChatWrapper) };
    let handle = match chat_wrapper.chat.send(message) {
        Ok(handle) => handle,
        Err(SendError::EmptyInput) => return ErrorCode::EmptyInput,
    };
    if let Some(on_session_finished) = &chat_wrapper.on_session_finished {
        let on_session_finished = Arc::clone(on_session_finished);
        runtime.spawn(async move {
            let (outcome, status) = session_outcome(&handle.join().await);
            on_session_finished(outcome, status);
        });
    }
    ErrorCode::Ok
}

/// Stops the reply that is being streamed. Returns `false` if there was
/// none.
///
/// # Safety
///
/// `chat` must be a valid pointer returned from `sc_chat_builder_build`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sc_chat_cancel_current(chat: *mut c_void) -> bool {
    // SAFETY: Assume the caller has provided the valid pointer.
    let chat = unsafe { &(*(chat as *mut ChatWrapper)).chat };
    chat.cancel_current()
}

/// Returns `true` while a reply is being awaited or streamed.
///
/// # Safety
///
/// `chat` must be a valid pointer returned from `sc_chat_builder_build`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sc_chat_is_streaming(chat: *mut c_void) -> bool {
    // SAFETY: Assume the caller has provided the valid pointer.
    let chat = unsafe { &(*(chat as *mut ChatWrapper)).chat };
    chat.is_streaming()
}

/// Stops any reply and removes all messages.
///
/// # Safety
///
/// `chat` must be a valid pointer returned from `sc_chat_builder_build`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sc_chat_clear(chat: *mut c_void) {
    // SAFETY: Assume the caller has provided the valid pointer.
    let chat = unsafe { &(*(chat as *mut ChatWrapper)).chat };
    chat.clear();
}

/// Frees a chat, stopping any reply that is still streaming.
///
/// # Safety
///
/// `chat` must be a valid pointer returned from `sc_chat_builder_build`, and
/// must not be used after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sc_chat_free(chat: *mut c_void) {
    // SAFETY: Assume the caller has provided the valid pointer.
    unsafe {
        let chat_ptr = chat as *mut ChatWrapper;
        drop(Box::from_raw(chat_ptr));
    }
}
