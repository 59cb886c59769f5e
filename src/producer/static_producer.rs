//! Static file/upload/delete/autoindex/redirect producer (§4.4). Grounded
//! in the teacher's `handle_get`/`Upload`/`ActiveAction::FileDownload`
//! (`src/handlers/upload_handler.rs`, `src/http/http_connection.rs`), redone
//! as an explicit incremental state machine so one `execute()` call does a
//! single bounded chunk of I/O.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::http::{Method, Request, ResponseMeta};
use crate::mime;
use crate::router::RouteDecision;

const CHUNK: usize = 4096;
const MAX_COLLISION_SUFFIXES: u32 = 100;

#[derive(Debug)]
enum Phase {
    Idle,
    FileRead(File),
    FileWrite(File, usize),
    IoComplete,
}

#[derive(Debug)]
pub struct StaticProducer {
    phase: Phase,
    method: Method,
    success_path: String,
    autoindex: bool,
    index: String,
    upload_path: Option<String>,
    redirect_to: Option<String>,
    content: Vec<u8>,
    status: u16,
    location_header: Option<String>,
    content_type: Option<String>,
    write_offset: usize,
}

impl StaticProducer {
    pub fn new(decision: &RouteDecision, request: &Request) -> Self {
        Self {
            phase: Phase::Idle,
            method: request.method,
            success_path: decision.success_path.clone(),
            autoindex: decision.autoindex,
            index: decision.index.clone(),
            upload_path: decision.upload_path.clone(),
            redirect_to: decision.redirect_to.clone(),
            content: request.content.clone(),
            status: decision.status,
            location_header: None,
            content_type: None,
            write_offset: 0,
        }
    }

    /// Drive one bounded step. Returns `true` once the producer has reached
    /// a terminal state (`is_complete`).
    pub fn execute(&mut self) -> bool {
        if let Some(target) = self.redirect_to.take() {
            self.finish_redirect(&target);
            return true;
        }

        match self.method {
            Method::Get => self.execute_get(),
            Method::Post => self.execute_post(),
            Method::Delete => self.execute_delete(),
        }
    }

    fn execute_get(&mut self) -> bool {
        loop {
            match &mut self.phase {
                Phase::Idle => {
                    let path = Path::new(&self.success_path);
                    match fs::metadata(path) {
                        Ok(meta) if meta.is_dir() => {
                            if !self.success_path.ends_with('/') {
                                self.status = 404;
                                self.phase = Phase::IoComplete;
                                return true;
                            }
                            if let Some(resolved) = self.resolve_directory(path) {
                                self.success_path = resolved;
                                continue;
                            }
                            return true;
                        }
                        Ok(_) => match File::open(path) {
                            Ok(file) => {
                                self.content_type = Some(mime::mime_type_for_path(path).to_string());
                                self.status = 200;
                                self.phase = Phase::FileRead(file);
                            }
                            Err(e) => {
                                self.status = status_for_open_error(&e);
                                self.phase = Phase::IoComplete;
                                return true;
                            }
                        },
                        Err(e) if e.kind() == ErrorKind::NotFound => {
                            self.status = 404;
                            self.phase = Phase::IoComplete;
                            return true;
                        }
                        Err(_) => {
                            self.status = 500;
                            self.phase = Phase::IoComplete;
                            return true;
                        }
                    }
                }
                Phase::FileRead(file) => {
                    let mut buf = vec![0u8; CHUNK];
                    match file.read(&mut buf) {
                        Ok(0) => {
                            self.phase = Phase::IoComplete;
                            return true;
                        }
                        Ok(n) => {
                            self.content.extend_from_slice(&buf[..n]);
                            return false;
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                        Err(_) => {
                            self.status = 500;
                            self.phase = Phase::IoComplete;
                            return true;
                        }
                    }
                }
                _ => return true,
            }
        }
    }

    fn resolve_directory(&mut self, dir: &Path) -> Option<String> {
        if !self.index.is_empty() {
            let indexed = dir.join(&self.index);
            if indexed.is_file() {
                return Some(indexed.to_string_lossy().to_string());
            }
        }
        if self.autoindex {
            self.content = render_autoindex(dir, &self.success_path);
            self.content_type = Some("text/html;charset=utf-8".to_string());
            self.status = 200;
            self.phase = Phase::IoComplete;
            None
        } else {
            self.status = 404;
            self.phase = Phase::IoComplete;
            None
        }
    }

    fn execute_post(&mut self) -> bool {
        loop {
            match &mut self.phase {
                Phase::Idle => {
                    let Some(upload_path) = &self.upload_path else {
                        self.status = 500;
                        self.phase = Phase::IoComplete;
                        return true;
                    };
                    let output_path = match unique_output_path(upload_path, &self.success_path) {
                        Some(p) => p,
                        None => {
                            self.status = 403;
                            self.phase = Phase::IoComplete;
                            return true;
                        }
                    };
                    match OpenOptions::new().write(true).create(true).truncate(true).open(&output_path) {
                        Ok(file) => {
                            self.location_header = Some(strip_leading_dot(&output_path));
                            self.phase = Phase::FileWrite(file, 0);
                        }
                        Err(e) => {
                            self.status = if e.kind() == ErrorKind::PermissionDenied { 403 } else { 500 };
                            self.phase = Phase::IoComplete;
                            return true;
                        }
                    }
                }
                Phase::FileWrite(file, offset) => {
                    if *offset >= self.content.len() {
                        self.status = 201;
                        let body = upload_success_page(self.location_header.as_deref().unwrap_or(""));
                        self.content = body;
                        self.content_type = Some("text/html".to_string());
                        self.phase = Phase::IoComplete;
                        return true;
                    }
                    let end = (*offset + CHUNK).min(self.content.len());
                    match file.write(&self.content[*offset..end]) {
                        Ok(n) => {
                            *offset += n;
                            return false;
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                        Err(_) => {
                            self.status = 500;
                            self.phase = Phase::IoComplete;
                            return true;
                        }
                    }
                }
                _ => return true,
            }
        }
    }

    fn execute_delete(&mut self) -> bool {
        let path = Path::new(&self.success_path);
        match fs::metadata(path) {
            Ok(_) => match fs::remove_file(path) {
                Ok(()) => {
                    self.status = 200;
                    self.content = delete_success_page();
                    self.content_type = Some("text/html".to_string());
                }
                Err(e) => {
                    self.status = if e.kind() == ErrorKind::PermissionDenied { 403 } else { 500 };
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => self.status = 404,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => self.status = 403,
            Err(_) => self.status = 500,
        }
        self.phase = Phase::IoComplete;
        true
    }

    fn finish_redirect(&mut self, target: &str) {
        self.content = redirect_page(target);
        self.content_type = Some("text/html".to_string());
        self.location_header = Some(target.to_string());
        self.phase = Phase::IoComplete;
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::IoComplete)
    }

    pub fn into_result(self) -> (ResponseMeta, Vec<u8>) {
        let meta = ResponseMeta {
            status: self.status,
            methods: None,
            keep_alive: true,
            content_type: self.content_type,
            location: self.location_header,
            extra_headers: Vec::new(),
        };
        (meta, self.content)
    }
}

fn status_for_open_error(e: &std::io::Error) -> u16 {
    match e.kind() {
        ErrorKind::PermissionDenied => 403,
        ErrorKind::NotFound => 404,
        _ if e.raw_os_error() == Some(libc_emfile()) => 503,
        _ => 500,
    }
}

/// `EMFILE`'s numeric value is platform-stable on Linux; avoided a direct
/// `libc` dependency for one constant.
fn libc_emfile() -> i32 {
    24
}

fn unique_output_path(upload_path: &str, request_path_tail: &str) -> Option<PathBuf> {
    let base = Path::new(upload_path).join(request_path_tail.trim_start_matches('/'));
    if !base.exists() {
        return Some(base);
    }
    let stem = base.file_stem()?.to_string_lossy().to_string();
    let ext = base.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    let parent = base.parent()?.to_path_buf();
    for n in 0..MAX_COLLISION_SUFFIXES {
        let candidate = parent.join(format!("{}_{}{}", stem, n, ext));
        if !candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn strip_leading_dot(path: &Path) -> String {
    let s = path.to_string_lossy();
    s.strip_prefix('.').map(str::to_string).unwrap_or_else(|| s.to_string())
}

fn render_autoindex(dir: &Path, original_url: &str) -> Vec<u8> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let Ok(name) = entry.file_name().into_string() else { continue };
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => dirs.push(name),
                _ => files.push(name),
            }
        }
    }
    dirs.sort();
    files.sort();

    let mut html = format!("<html><body><h1>Index of {}</h1><ul>", original_url);
    for name in dirs {
        let encoded = crate::uri::encode_ascii_to_hex(&name);
        html.push_str(&format!("<li><a href=\"./{}/\">{}/</a></li>", encoded, name));
    }
    for name in files {
        let encoded = crate::uri::encode_ascii_to_hex(&name);
        html.push_str(&format!("<li><a href=\"./{}\">{}</a></li>", encoded, name));
    }
    html.push_str("</ul></body></html>");
    html.into_bytes()
}

fn upload_success_page(location: &str) -> Vec<u8> {
    format!("<html><body><h1>Upload complete</h1><p>{}</p></body></html>", location).into_bytes()
}

fn delete_success_page() -> Vec<u8> {
    b"<html><body><h1>Deleted</h1></body></html>".to_vec()
}

fn redirect_page(target: &str) -> Vec<u8> {
    format!("<html><body><h1>Moved</h1><a href=\"{}\">{}</a></body></html>", target, target).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Methods;
    use crate::http::{HeaderMap, Version};

    fn decision(path: &str) -> RouteDecision {
        RouteDecision {
            is_cgi: false,
            status: 200,
            methods: Methods::GET,
            success_path: path.to_string(),
            error_path: String::new(),
            redirect_to: None,
            autoindex: false,
            upload_path: None,
            cgi_env: None,
            cgi_argv: None,
        }
    }

    fn request(method: Method) -> Request {
        Request {
            method,
            version: Version::Http11,
            path: "/x".to_string(),
            query: String::new(),
            host: "_".to_string(),
            header: HeaderMap::new(),
            content: Vec::new(),
            keep_alive: true,
        }
    }

    #[test]
    fn get_missing_file_is_404() {
        let d = decision("./does/not/exist.html");
        let req = request(Method::Get);
        let mut p = StaticProducer::new(&d, &req);
        while !p.execute() {}
        assert!(p.is_complete());
        let (meta, _) = p.into_result();
        assert_eq!(meta.status, 404);
    }

    #[test]
    fn delete_missing_file_is_404() {
        let d = decision("./tmp/does-not-exist-xyz");
        let req = request(Method::Delete);
        let mut p = StaticProducer::new(&d, &req);
        while !p.execute() {}
        let (meta, _) = p.into_result();
        assert_eq!(meta.status, 404);
    }

    #[test]
    fn autoindex_hrefs_are_dot_relative_and_dirs_get_trailing_slash() {
        let dir = std::env::temp_dir().join("brilliant_server_test_autoindex_href");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("file.txt"), b"x").unwrap();

        let html = String::from_utf8(render_autoindex(&dir, "/listing/")).unwrap();
        assert!(html.contains("<a href=\"./sub/\">sub/</a>"));
        assert!(html.contains("<a href=\"./file.txt\">file.txt</a>"));

        fs::remove_dir_all(&dir).ok();
    }
}
