#![allow(dead_code)]

pub mod harness {
    use brrtweb::application::Application;
    use brrtweb::config::Settings;
    use brrtweb::dispatcher::Dispatch;
    use brrtweb::server::{RawRequest, Response};
    use brrtweb::HandlerError;

    /// Collected outcome of one request.
    #[derive(Debug)]
    pub struct Outcome {
        pub status: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
        /// Failure that interrupted the body stream after headers were sent
        pub stream_error: Option<String>,
    }

    impl Outcome {
        pub fn code(&self) -> u16 {
            self.status[..3].parse().unwrap()
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }

        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn header_all(&self, name: &str) -> Vec<&str> {
            self.headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
                .collect()
        }
    }

    pub fn settings(debug: bool) -> Settings {
        Settings {
            debug,
            ..Settings::default()
        }
    }

    /// An application with pinned debug settings.
    pub fn app<D: Dispatch + 'static>(root: D) -> Application {
        Application::new(root).settings(settings(true))
    }

    pub fn drain(response: Response) -> Outcome {
        let status = response.status().to_string();
        let headers = response.headers().to_vec();
        let (body, stream_error) = match response.collect() {
            Ok(body) => (body, None),
            Err((body, err)) => (body, Some(err.to_string())),
        };
        Outcome {
            status,
            headers,
            body,
            stream_error,
        }
    }

    /// Run one request; an unhandled failure panics.
    pub fn call(app: &Application, request: RawRequest) -> Outcome {
        match app.handle(request) {
            Ok(response) => drain(response),
            Err(err) => panic!("unhandled error: {err}"),
        }
    }

    pub fn get(app: &Application, target: &str) -> Outcome {
        call(app, RawRequest::new("GET", target))
    }

    /// Run one request expecting an unhandled failure.
    pub fn call_unhandled(app: &Application, request: RawRequest) -> HandlerError {
        match app.handle(request) {
            Ok(response) => panic!("expected an unhandled error, got {}", response.status()),
            Err(err) => err.error,
        }
    }
}

pub mod fixtures {
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// `a/a1 = "A1"`, `a/a2 = "A2"`, `b = "B"`.
    pub fn static_tree() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/a1", "A1");
        write(dir.path(), "a/a2", "A2");
        write(dir.path(), "b", "B");
        dir
    }

    pub fn write(base: &Path, relative: &str, contents: &str) {
        let path = base.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
}

pub mod test_server {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}
