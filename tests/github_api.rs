//! GitHub client behavior against a mocked API server

use hgmirror::github::{GitHubClient, HostingApi, NewRepository, RepositoryEdit};
use octocrab::Octocrab;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client(server: &MockServer) -> GitHubClient {
    let octocrab = Octocrab::builder()
        .base_uri(server.uri())
        .unwrap()
        .build()
        .unwrap();
    GitHubClient::with_octocrab(octocrab, "tryton")
}

fn repository_json(name: &str, has_wiki: bool, default_branch: &str) -> serde_json::Value {
    json!({
        "id": 1,
        "node_id": "R_1",
        "name": name,
        "full_name": format!("tryton/{}", name),
        "url": format!("https://api.github.com/repos/tryton/{}", name),
        "html_url": format!("https://github.com/tryton/{}", name),
        "homepage": format!("http://hg.tryton.org/{}", name),
        "has_wiki": has_wiki,
        "has_issues": false,
        "default_branch": default_branch,
    })
}

#[tokio::test]
async fn test_get_repository_not_found_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/tryton/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found",
            "documentation_url": "https://docs.github.com/rest/repos/repos#get-a-repository",
        })))
        .mount(&server)
        .await;

    let client = client(&server).await;

    assert_eq!(client.get_repository("ghost").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_repository_present() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/tryton/trytond"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(repository_json("trytond", true, "develop")),
        )
        .mount(&server)
        .await;

    let client = client(&server).await;
    let repo = client.get_repository("trytond").await.unwrap().unwrap();

    assert_eq!(repo.name, "trytond");
    assert!(repo.has_wiki);
    assert!(!repo.has_issues);
    assert_eq!(repo.default_branch.as_deref(), Some("develop"));
    assert_eq!(repo.homepage.as_deref(), Some("http://hg.tryton.org/trytond"));
}

#[tokio::test]
async fn test_server_error_is_not_treated_as_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/tryton/trytond"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "message": "Server Error",
        })))
        .mount(&server)
        .await;

    let client = client(&server).await;

    assert!(client.get_repository("trytond").await.is_err());
}

#[tokio::test]
async fn test_list_repositories_reads_single_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/tryton/repos"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            repository_json("trytond", false, "develop"),
            repository_json("party", true, "master"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let repos = client.list_repositories().await.unwrap();

    let names: Vec<_> = repos.iter().map(|repo| repo.name.as_str()).collect();
    assert_eq!(names, ["trytond", "party"]);
}

#[tokio::test]
async fn test_create_repository_posts_settings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orgs/tryton/repos"))
        .and(body_json(json!({
            "name": "party",
            "description": "Mirror of party",
            "homepage": "http://hg.tryton.org/modules/party",
            "has_wiki": false,
            "has_issues": false,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 2, "name": "party"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;
    client
        .create_repository(&NewRepository {
            name: "party".to_string(),
            description: "Mirror of party".to_string(),
            homepage: "http://hg.tryton.org/modules/party".to_string(),
            has_wiki: false,
            has_issues: false,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_edit_repository_patches_full_state() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/repos/tryton/party"))
        .and(body_json(json!({
            "name": "party",
            "homepage": "http://hg.tryton.org/modules/party",
            "has_wiki": false,
            "has_issues": false,
            "default_branch": "develop",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "party"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;
    client
        .edit_repository(&RepositoryEdit {
            name: "party".to_string(),
            homepage: "http://hg.tryton.org/modules/party".to_string(),
            has_wiki: false,
            has_issues: false,
            default_branch: Some("develop".to_string()),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_list_branches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/tryton/party/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "name": "default",
                "commit": {"sha": "a1", "url": "https://api.github.com/repos/tryton/party/commits/a1"},
                "protected": false,
            },
            {
                "name": "develop",
                "commit": {"sha": "b2", "url": "https://api.github.com/repos/tryton/party/commits/b2"},
                "protected": false,
            },
        ])))
        .mount(&server)
        .await;

    let client = client(&server).await;

    assert_eq!(
        client.list_branches("party").await.unwrap(),
        ["default", "develop"]
    );
}
