//! HTTP sessions over a blocking client.
//!
//! Protocol handling belongs to the transport crate; this layer converts
//! the request/response objects to and from C and surfaces the numeric
//! status code verbatim.

use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderName, HeaderValue};

use crate::error::{LyraError, LyraErrorCode};
use crate::handle::{Registry, RemoveError, define_handle};
use crate::types::LyraTime;
use crate::util::{cstr_to_string, set_error, set_ok};

/// Request methods.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyraHttpMethod {
    Get = 0,
    Post = 1,
    Head = 2,
    Put = 3,
    Delete = 4,
}

impl LyraHttpMethod {
    fn to_reqwest(self) -> reqwest::Method {
        match self {
            LyraHttpMethod::Get => reqwest::Method::GET,
            LyraHttpMethod::Post => reqwest::Method::POST,
            LyraHttpMethod::Head => reqwest::Method::HEAD,
            LyraHttpMethod::Put => reqwest::Method::PUT,
            LyraHttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

pub(crate) struct HttpData {
    client: Client,
    host: Mutex<Option<Url>>,
}

static SESSIONS: Registry<HttpData> = Registry::new();

define_handle!(
    /// Handle to an HTTP session.
    LyraHttp
);

fn get_session(handle: LyraHttp) -> Option<Arc<HttpData>> {
    SESSIONS.get(handle.raw())
}

pub(crate) struct HttpRequestData {
    method: Mutex<LyraHttpMethod>,
    uri: Mutex<String>,
    body: Mutex<Vec<u8>>,
    fields: Mutex<Vec<(String, String)>>,
}

static REQUESTS: Registry<HttpRequestData> = Registry::new();

define_handle!(
    /// Handle to an HTTP request under construction.
    LyraHttpRequest
);

fn get_request(handle: LyraHttpRequest) -> Option<Arc<HttpRequestData>> {
    REQUESTS.get(handle.raw())
}

pub(crate) struct HttpResponseData {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    field_cache: Mutex<CString>,
}

static RESPONSES: Registry<HttpResponseData> = Registry::new();

define_handle!(
    /// Handle to a received HTTP response.
    LyraHttpResponse
);

fn get_response(handle: LyraHttpResponse) -> Option<Arc<HttpResponseData>> {
    RESPONSES.get(handle.raw())
}

/// Create an HTTP session.
///
/// # Ownership
///
/// Caller owns the returned handle. Must call `lyra_http_destroy()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_create(error: *mut LyraError) -> LyraHttp {
    let client = match Client::builder().build() {
        Ok(c) => c,
        Err(e) => return unsafe { set_error(error, e.into()) },
    };

    unsafe { set_ok(error) };
    LyraHttp::from_raw(SESSIONS.insert(HttpData {
        client,
        host: Mutex::new(None),
    }))
}

/// Destroy an HTTP session.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_destroy(http: LyraHttp, error: *mut LyraError) -> bool {
    match SESSIONS.remove(http.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe {
            set_error(error, LyraError::resource_busy("http session"))
        },
    }
}

/// Set the base host for subsequent requests.
///
/// A scheme-less host gets `http://`; `port` of 0 keeps the scheme
/// default.
///
/// # Safety
///
/// - `host` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_set_host(
    http: LyraHttp,
    host: *const c_char,
    port: u16,
    error: *mut LyraError,
) -> bool {
    let data = match get_session(http) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    let host = match unsafe { cstr_to_string(host, "host") } {
        Ok(h) => h,
        Err(e) => return unsafe { set_error(error, e) },
    };

    let with_scheme = if host.contains("://") {
        host
    } else {
        format!("http://{host}")
    };

    let mut url = match Url::parse(&with_scheme) {
        Ok(u) => u,
        Err(e) => {
            return unsafe {
                set_error(
                    error,
                    LyraError::new(LyraErrorCode::InvalidUri, format!("invalid host: {e}")),
                )
            };
        }
    };
    if port != 0 && url.set_port(Some(port)).is_err() {
        return unsafe {
            set_error(
                error,
                LyraError::new(LyraErrorCode::InvalidUri, "host does not accept a port"),
            )
        };
    }

    *data.host.lock() = Some(url);
    unsafe { set_ok(error) };
    true
}

/// Create an empty GET request for "/".
///
/// # Ownership
///
/// Caller owns the returned handle. Must call
/// `lyra_http_request_destroy()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_request_create(error: *mut LyraError) -> LyraHttpRequest {
    unsafe { set_ok(error) };
    LyraHttpRequest::from_raw(REQUESTS.insert(HttpRequestData {
        method: Mutex::new(LyraHttpMethod::Get),
        uri: Mutex::new("/".to_string()),
        body: Mutex::new(Vec::new()),
        fields: Mutex::new(Vec::new()),
    }))
}

/// Destroy a request.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_request_destroy(
    request: LyraHttpRequest,
    error: *mut LyraError,
) -> bool {
    match REQUESTS.remove(request.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe {
            set_error(error, LyraError::resource_busy("http request"))
        },
    }
}

/// Set the request method.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_request_set_method(
    request: LyraHttpRequest,
    method: LyraHttpMethod,
    error: *mut LyraError,
) -> bool {
    match get_request(request) {
        Some(d) => {
            *d.method.lock() = method;
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Set the request target (path and query), e.g. "/index.html".
///
/// # Safety
///
/// - `uri` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_request_set_uri(
    request: LyraHttpRequest,
    uri: *const c_char,
    error: *mut LyraError,
) -> bool {
    let data = match get_request(request) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    let uri = match unsafe { cstr_to_string(uri, "uri") } {
        Ok(u) => u,
        Err(e) => return unsafe { set_error(error, e) },
    };

    *data.uri.lock() = if uri.starts_with('/') {
        uri
    } else {
        format!("/{uri}")
    };
    unsafe { set_ok(error) };
    true
}

/// Set the request body.
///
/// # Safety
///
/// - `body` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_request_set_body(
    request: LyraHttpRequest,
    body: *const c_char,
    error: *mut LyraError,
) -> bool {
    let data = match get_request(request) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    let body = match unsafe { cstr_to_string(body, "body") } {
        Ok(b) => b,
        Err(e) => return unsafe { set_error(error, e) },
    };

    *data.body.lock() = body.into_bytes();
    unsafe { set_ok(error) };
    true
}

/// Set a header field, replacing an existing value for the same name.
///
/// # Safety
///
/// - `field` and `value` must be valid null-terminated UTF-8 strings or
///   NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_request_set_field(
    request: LyraHttpRequest,
    field: *const c_char,
    value: *const c_char,
    error: *mut LyraError,
) -> bool {
    let data = match get_request(request) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    let field = match unsafe { cstr_to_string(field, "field") } {
        Ok(f) => f,
        Err(e) => return unsafe { set_error(error, e) },
    };
    let value = match unsafe { cstr_to_string(value, "value") } {
        Ok(v) => v,
        Err(e) => return unsafe { set_error(error, e) },
    };

    let mut fields = data.fields.lock();
    if let Some(entry) = fields
        .iter_mut()
        .find(|(name, _)| name.eq_ignore_ascii_case(&field))
    {
        entry.1 = value;
    } else {
        fields.push((field, value));
    }
    unsafe { set_ok(error) };
    true
}

/// Send a request and block until the response arrives.
///
/// # Parameters
///
/// - `http`: Valid session handle with a host set
/// - `request`: Valid request handle
/// - `timeout`: Per-request timeout; zero or negative means no timeout
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// Response handle on success, the invalid handle on transport failure.
/// HTTP error statuses (4xx, 5xx) are successful transports; inspect the
/// response status.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_send_request(
    http: LyraHttp,
    request: LyraHttpRequest,
    timeout: LyraTime,
    error: *mut LyraError,
) -> LyraHttpResponse {
    let session = match get_session(http) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    let request = match get_request(request) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    let base = match &*session.host.lock() {
        Some(u) => u.clone(),
        None => {
            return unsafe {
                set_error(error, LyraError::invalid_argument("no host set on the session"))
            };
        }
    };
    let url = match base.join(&request.uri.lock()) {
        Ok(u) => u,
        Err(e) => {
            return unsafe {
                set_error(
                    error,
                    LyraError::new(LyraErrorCode::InvalidUri, format!("invalid uri: {e}")),
                )
            };
        }
    };

    let mut builder = session
        .client
        .request(request.method.lock().to_reqwest(), url);
    for (name, value) in request.fields.lock().iter() {
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(n) => n,
            Err(e) => {
                return unsafe {
                    set_error(error, LyraError::invalid_argument(format!("invalid header: {e}")))
                };
            }
        };
        let value = match HeaderValue::from_str(value) {
            Ok(v) => v,
            Err(e) => {
                return unsafe {
                    set_error(error, LyraError::invalid_argument(format!("invalid header: {e}")))
                };
            }
        };
        builder = builder.header(name, value);
    }
    let body = request.body.lock().clone();
    if !body.is_empty() {
        builder = builder.body(body);
    }
    if timeout.microseconds > 0 {
        builder = builder.timeout(timeout.to_duration());
    }

    let response = match builder.send() {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("http request failed: {e}");
            return unsafe { set_error(error, e.into()) };
        }
    };

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = match response.bytes() {
        Ok(b) => b.to_vec(),
        Err(e) => return unsafe { set_error(error, e.into()) },
    };

    unsafe { set_ok(error) };
    LyraHttpResponse::from_raw(RESPONSES.insert(HttpResponseData {
        status,
        headers,
        body,
        field_cache: Mutex::new(CString::default()),
    }))
}

/// Destroy a response.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_response_destroy(
    response: LyraHttpResponse,
    error: *mut LyraError,
) -> bool {
    match RESPONSES.remove(response.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe {
            set_error(error, LyraError::resource_busy("http response"))
        },
    }
}

/// Numeric HTTP status of the response (e.g. 200, 404).
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_response_get_status(
    response: LyraHttpResponse,
    error: *mut LyraError,
) -> u32 {
    match get_response(response) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.status as u32
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Look up a response header by case-insensitive name.
///
/// The pointer points into a cache owned by this response handle and is
/// overwritten by the next field lookup on the same handle.
///
/// # Returns
///
/// Header value, or NULL when the field is absent.
///
/// # Safety
///
/// - `field` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_response_get_field(
    response: LyraHttpResponse,
    field: *const c_char,
    error: *mut LyraError,
) -> *const c_char {
    let data = match get_response(response) {
        Some(d) => d,
        None => {
            return unsafe {
                crate::util::set_error_null::<c_char>(error, LyraError::invalid_handle())
            }
            .cast_const();
        }
    };
    let field = match unsafe { cstr_to_string(field, "field") } {
        Ok(f) => f,
        Err(e) => {
            return unsafe { crate::util::set_error_null::<c_char>(error, e) }.cast_const();
        }
    };

    unsafe { set_ok(error) };
    match data
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&field))
    {
        Some((_, value)) => {
            let mut cache = data.field_cache.lock();
            *cache = CString::new(value.as_str()).unwrap_or_default();
            cache.as_ptr()
        }
        None => std::ptr::null(),
    }
}

/// Get the response body.
///
/// The pointer stays valid for the response handle's lifetime.
///
/// # Parameters
///
/// - `response`: Valid response handle
/// - `size`: Out-parameter for the body length in bytes (may be NULL)
/// - `error`: Out-parameter for error information
///
/// # Safety
///
/// - `size` must be a valid pointer or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_http_response_get_body(
    response: LyraHttpResponse,
    size: *mut usize,
    error: *mut LyraError,
) -> *const u8 {
    let data = match get_response(response) {
        Some(d) => d,
        None => {
            return unsafe { crate::util::set_error_null::<u8>(error, LyraError::invalid_handle()) }
                .cast_const();
        }
    };

    if let Some(out) = unsafe { size.as_mut() } {
        *out = data.body.len();
    }
    unsafe { set_ok(error) };
    data.body.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// One-shot HTTP server on the loopback interface.
    fn serve_canned_response() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buffer = [0u8; 2048];
            let mut request = Vec::new();
            loop {
                let n = stream.read(&mut buffer).unwrap_or(0);
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let _ = stream.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-Canary: chirp\r\nConnection: close\r\n\r\nhello",
            );
        });
        port
    }

    #[test]
    fn request_round_trip_against_local_server() {
        let port = serve_canned_response();

        let mut error = LyraError::ok();
        let http = unsafe { lyra_http_create(&mut error) };
        let host = CString::new("127.0.0.1").unwrap();
        assert!(unsafe { lyra_http_set_host(http, host.as_ptr(), port, &mut error) });

        let request = unsafe { lyra_http_request_create(&mut error) };
        let uri = CString::new("/index.html").unwrap();
        assert!(unsafe { lyra_http_request_set_uri(request, uri.as_ptr(), &mut error) });
        let field = CString::new("X-Client").unwrap();
        let value = CString::new("lyra").unwrap();
        assert!(unsafe {
            lyra_http_request_set_field(request, field.as_ptr(), value.as_ptr(), &mut error)
        });

        let timeout = crate::types::lyra_time_from_seconds(5.0);
        let response = unsafe { lyra_http_send_request(http, request, timeout, &mut error) };
        assert!(response.is_valid(), "transport failed: {:?}", error.code);

        assert_eq!(
            unsafe { lyra_http_response_get_status(response, &mut error) },
            200
        );

        let canary = CString::new("x-canary").unwrap();
        let canary_value =
            unsafe { lyra_http_response_get_field(response, canary.as_ptr(), &mut error) };
        assert!(!canary_value.is_null());
        assert_eq!(
            unsafe { CStr::from_ptr(canary_value) }.to_str().unwrap(),
            "chirp"
        );

        let mut body_len = 0usize;
        let body = unsafe { lyra_http_response_get_body(response, &mut body_len, &mut error) };
        assert_eq!(
            unsafe { std::slice::from_raw_parts(body, body_len) },
            b"hello"
        );

        unsafe {
            lyra_http_response_destroy(response, &mut error);
            lyra_http_request_destroy(request, &mut error);
            lyra_http_destroy(http, &mut error);
        }
    }

    #[test]
    fn invalid_host_is_rejected() {
        let mut error = LyraError::ok();
        let http = unsafe { lyra_http_create(&mut error) };
        let host = CString::new("http://").unwrap();
        assert!(!unsafe { lyra_http_set_host(http, host.as_ptr(), 0, &mut error) });
        assert_eq!(error.code, LyraErrorCode::InvalidUri);
        unsafe { crate::error::lyra_error_free(&mut error) };
        assert!(unsafe { lyra_http_destroy(http, &mut error) });
    }

    #[test]
    fn send_without_host_fails() {
        let mut error = LyraError::ok();
        let http = unsafe { lyra_http_create(&mut error) };
        let request = unsafe { lyra_http_request_create(&mut error) };

        let response =
            unsafe { lyra_http_send_request(http, request, LyraTime::ZERO, &mut error) };
        assert!(!response.is_valid());
        assert_eq!(error.code, LyraErrorCode::InvalidArgument);
        unsafe { crate::error::lyra_error_free(&mut error) };

        unsafe {
            lyra_http_request_destroy(request, &mut error);
            lyra_http_destroy(http, &mut error);
        }
    }
}
