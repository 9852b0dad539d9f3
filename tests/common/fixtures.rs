//! Mock API fixtures

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Body served for a file download
pub fn file_body(id: u64, name: &str) -> String {
    format!("{} of thing {}", name, id)
}

/// Mount detail, file list, image list and download endpoints for one thing
///
/// `files` are `(name, date)` pairs; dates use `%Y-%m-%d %H:%M:%S`.
pub async fn mount_thing(server: &MockServer, id: u64, title: &str, files: &[(&str, &str)]) {
    Mock::given(method("GET"))
        .and(path(format!("/things/{}/", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": title,
            "license": "Creative Commons - Attribution",
            "details": format!("Description of {}", title),
        })))
        .mount(server)
        .await;

    let listing: Vec<_> = files
        .iter()
        .map(|(name, date)| {
            json!({
                "name": name,
                "date": date,
                "url": format!("{}/download/{}/{}", server.uri(), id, name),
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/things/{}/files/", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/things/{}/images/", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "Main.jpg", "sizes": [
                {"type": "display", "size": "large", "url": format!("{}/img/{}.jpg", server.uri(), id)}
            ]}
        ])))
        .mount(server)
        .await;

    for (name, _) in files {
        Mock::given(method("GET"))
            .and(path(format!("/download/{}/{}", id, name)))
            .respond_with(ResponseTemplate::new(200).set_body_string(file_body(id, name)))
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path(format!("/img/{}.jpg", id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
        .mount(server)
        .await;
}

/// Mount a paginated listing: `pages[0]` is page 1; the page after the last is empty
pub async fn mount_listing(server: &MockServer, listing_path: &str, pages: &[Vec<(u64, &str)>]) {
    for (index, page) in pages.iter().enumerate() {
        let items: Vec<_> = page
            .iter()
            .map(|(id, name)| {
                json!({"id": id, "name": name, "url": format!("{}/things/{}", server.uri(), id)})
            })
            .collect();
        Mock::given(method("GET"))
            .and(path(listing_path))
            .and(query_param("page", (index + 1).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(items))
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path(listing_path))
        .and(query_param("page", (pages.len() + 1).to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

/// Paths of every file download the server has seen
pub async fn download_requests(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().starts_with("/download/"))
        .map(|r| r.url.path().to_string())
        .collect()
}
