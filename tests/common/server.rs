use std::{collections::HashMap, time::Duration};

use tiny_http::{Request, Response, Server};

/// Start a HTTP server in a random port, to serve the files in `files`.
///
/// Keys are the request paths, without the query string. Any other path
/// gets a `404` response.
///
/// Returns the port number of the server.
pub fn start_server(files: &[(&'static str, &'static str)]) -> u16 {
    let server = Server::http("127.1:0").expect("start HTTP server");
    let port = server.server_addr().to_ip().unwrap().port();

    let files = Files(files.iter().copied().collect());

    std::thread::spawn(move || {
        let timeout = Duration::from_secs(30);

        while let Ok(Some(request)) = server.recv_timeout(timeout) {
            files.handle(request);
        }
    });

    port
}

struct Files(HashMap<&'static str, &'static str>);

impl Files {
    fn handle(&self, request: Request) {
        let path = match request.url().split_once('?') {
            Some((path, _)) => path,
            None => request.url(),
        };

        let response = match self.0.get(path) {
            Some(data) => Response::from_string(*data),
            None => Response::from_string("Not Found").with_status_code(404),
        };

        request.respond(response).expect("send response");
    }
}
