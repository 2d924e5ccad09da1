// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the balena supervisor reboot client using wiremock.

#![cfg(feature = "balena")]

use detectordag_edge::error::RebootError;
use detectordag_edge::supervisor::{BalenaSupervisor, RebootHandler};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn reboot_posts_forced_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/reboot"))
        .and(query_param("apikey", "secret"))
        .and(body_json(serde_json::json!({ "force": true })))
        .respond_with(ResponseTemplate::new(202).set_body_string("OK"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let supervisor = BalenaSupervisor::new(mock_server.uri(), "secret").unwrap();
    supervisor.reboot().await.unwrap();
}

#[tokio::test]
async fn api_key_is_url_encoded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/reboot"))
        .and(query_param("apikey", "a key&more"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let supervisor = BalenaSupervisor::new(format!("{}/", mock_server.uri()), "a key&more").unwrap();
    supervisor.reboot().await.unwrap();
}

#[tokio::test]
async fn refused_reboot_reports_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/reboot"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&mock_server)
        .await;

    let supervisor = BalenaSupervisor::new(mock_server.uri(), "wrong").unwrap();
    let result = supervisor.reboot().await;

    assert!(matches!(result, Err(RebootError::Refused(401))));
}

#[tokio::test]
async fn request_reboot_swallows_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/reboot"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let supervisor = BalenaSupervisor::new(mock_server.uri(), "secret").unwrap();
    supervisor.request_reboot().await;
}

#[tokio::test]
async fn unreachable_supervisor_is_an_http_error() {
    let supervisor = BalenaSupervisor::new("http://127.0.0.1:1", "secret").unwrap();
    let result = supervisor.reboot().await;

    assert!(matches!(result, Err(RebootError::Http(_))));
}
