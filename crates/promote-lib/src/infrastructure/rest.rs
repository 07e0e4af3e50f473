//! Content repository backed by the BI server REST API.

use log::{debug, info};
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::Connection;
use crate::domain::{
    ContentItem, ContentRepository, ModuleDefinition, ObjectKind, ObjectUpdate, RepositoryError,
    Specification,
};

/// `User-Agent` header sent with every request.
const USER_AGENT: &str = "promote-cli";
/// Seconds allowed to establish a connection.
const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Seconds allowed for a whole request.
const REQUEST_TIMEOUT_SECS: u64 = 60;
/// Cookie carrying the session passport.
const PASSPORT_COOKIE: &str = "cam_passport";
/// Cookie carrying the anti-forgery token.
const XSRF_COOKIE: &str = "XSRF-TOKEN";

/// Errors that can occur when talking to the content REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP client cannot be built.
    #[error("failed to create HTTP client")]
    ClientInit(#[source] reqwest::Error),

    /// The request never got a response.
    #[error("failed to send {operation} request to {url}")]
    Request {
        /// What was being done.
        operation: &'static str,
        /// Request URL.
        url: String,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("API returned status {status} for {url}")]
    ApiStatus {
        /// Response status.
        status: reqwest::StatusCode,
        /// Request URL.
        url: String,
    },

    /// The response body is not the expected JSON.
    #[error("failed to parse response from {url}")]
    ParseResponse {
        /// Request URL.
        url: String,
        /// Decoding failure.
        #[source]
        source: reqwest::Error,
    },

    /// Login succeeded without setting a session cookie.
    #[error("login to {url} did not set the {cookie} cookie")]
    MissingCookie {
        /// Login URL.
        url: String,
        /// Cookie name.
        cookie: &'static str,
    },

    /// A response lacks a field this tool needs.
    #[error("response from {url} has no {field}")]
    MissingField {
        /// Request URL.
        url: String,
        /// Field name.
        field: &'static str,
    },
}

/// Body of the login call.
#[derive(Serialize)]
struct LoginRequest<'body> {
    /// Namespace, user name and password.
    parameters: [LoginParameter<'body>; 3],
}

/// One named login value.
#[derive(Serialize)]
struct LoginParameter<'body> {
    /// Parameter name.
    name: &'static str,
    /// Parameter value.
    value: &'body str,
}

/// Folder listing response.
#[derive(Deserialize)]
struct FolderListing {
    /// Direct children.
    #[serde(default)]
    content: Vec<ContentItem>,
}

/// Response to a specification request.
#[derive(Deserialize)]
struct SpecificationResponse {
    /// Requested fields.
    #[serde(default)]
    fields: SpecificationFields,
}

/// Fields of a specification response.
#[derive(Default, Deserialize)]
struct SpecificationFields {
    /// Specification XML.
    specification: Option<String>,
}

/// Response to a description request.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionResponse {
    /// Description in the default locale.
    #[serde(default)]
    default_description: Option<String>,
    /// Some servers return the localized variant only.
    #[serde(default)]
    description: Option<serde_json::Value>,
}

/// Response to a create or copy call.
#[derive(Deserialize)]
struct CreatedObject {
    /// Id of the new object, when the server reports it.
    #[serde(default)]
    id: Option<String>,
}

/// Body of the copy call.
#[derive(Serialize)]
struct CopyRequest<'body> {
    /// Object to copy.
    source_id: &'body str,
    /// Folder receiving the copy.
    destination_id: &'body str,
    /// Whether to copy children too.
    recursive: bool,
}

/// Authentication material returned by the login endpoint.
struct Session {
    /// Sent in the authorization header.
    passport: String,
    /// Sent in the anti-forgery header.
    xsrf_token: String,
}

/// A content store reached over its REST API.
pub struct RestRepository {
    /// Cookie-aware HTTP client.
    client: Client,
    /// API root without a trailing slash.
    base_url: String,
    /// Login material.
    session: Session,
}

impl RestRepository {
    /// Open a session against the server described by `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ClientInit`] if the HTTP client cannot be built,
    /// [`ApiError::MissingCookie`] if the login response lacks a session cookie,
    /// or a request/status error if the login is rejected.
    ///
    /// # Panics
    ///
    /// This method panics if called from within an async runtime. See docs on
    /// [`reqwest::blocking`] for details.
    pub fn connect(connection: &Connection) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .no_proxy()
            .danger_accept_invalid_certs(!connection.verify_tls)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(ApiError::ClientInit)?;

        let url = format!("{}/session", connection.base_url);
        let payload = LoginRequest {
            parameters: [
                LoginParameter {
                    name: "CAMNamespace",
                    value: &connection.namespace,
                },
                LoginParameter {
                    name: "CAMUsername",
                    value: &connection.username,
                },
                LoginParameter {
                    name: "CAMPassword",
                    value: &connection.password,
                },
            ],
        };

        let sent = client
            .put(&url)
            .json(&payload)
            .send()
            .map_err(|source| ApiError::Request {
                operation: "login",
                url: url.clone(),
                source,
            })?;
        let response = check_status(sent, &url)?;

        let cookie = |name: &'static str| {
            response
                .cookies()
                .find(|c| c.name() == name)
                .map(|c| c.value().to_owned())
                .ok_or_else(|| ApiError::MissingCookie {
                    url: url.clone(),
                    cookie: name,
                })
        };
        let session = Session {
            passport: cookie(PASSPORT_COOKIE)?,
            xsrf_token: cookie(XSRF_COOKIE)?,
        };

        info!("Session created for {}", connection.base_url);
        Ok(Self {
            client,
            base_url: connection.base_url.clone(),
            session,
        })
    }

    /// Absolute URL of an API path.
    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// A request carrying the session headers.
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("IBM-BA-Authorization", format!("CAM {}", self.session.passport))
            .header("X-XSRF-Token", &self.session.xsrf_token)
    }

    /// Send `request` and reject non-success statuses.
    fn send(
        &self,
        operation: &'static str,
        url: &str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        debug!("{operation}: {url}");
        let response = request.send().map_err(|source| ApiError::Request {
            operation,
            url: url.to_owned(),
            source,
        })?;
        check_status(response, url)
    }

    /// GET `path` and decode the JSON answer.
    fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send(operation, &url, self.request(Method::GET, &url))?;
        parse_json(response, &url)
    }

    /// Send `body` as JSON to `path`.
    fn send_json<B: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        self.send(operation, &url, self.request(method, &url).json(body))
    }

    /// Turn an [`ApiError`] into a [`RepositoryError`] naming this server.
    fn wrap(&self, operation: &'static str) -> impl Fn(ApiError) -> RepositoryError + '_ {
        move |source| RepositoryError::Api {
            operation,
            location: self.base_url.clone(),
            source: Box::new(source),
        }
    }
}

/// Pass successful responses through.
fn check_status(response: Response, url: &str) -> Result<Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ApiError::ApiStatus {
            status: response.status(),
            url: url.to_owned(),
        })
    }
}

/// Decode a JSON response body.
fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
    response.json().map_err(|source| ApiError::ParseResponse {
        url: url.to_owned(),
        source,
    })
}

impl ContentRepository for RestRepository {
    fn location(&self) -> &str {
        &self.base_url
    }

    fn folder_items(&self, folder_id: &str) -> Result<Vec<ContentItem>, RepositoryError> {
        let listing: FolderListing = self
            .get_json("list folder", &format!("content/{folder_id}/items?fields=*"))
            .map_err(self.wrap("list folder"))?;
        Ok(listing.content)
    }

    fn module_definition(&self, id: &str) -> Result<ModuleDefinition, RepositoryError> {
        self.get_json("get module", &format!("modules/{id}"))
            .map_err(self.wrap("get module"))
    }

    fn specification(
        &self,
        id: &str,
        kind: &ObjectKind,
    ) -> Result<Specification, RepositoryError> {
        if *kind == ObjectKind::Module {
            return self.module_definition(id).map(Specification::Module);
        }
        let path = format!("content/{id}?fields=specification");
        let response: SpecificationResponse = self
            .get_json("get specification", &path)
            .map_err(self.wrap("get specification"))?;
        response
            .fields
            .specification
            .map(Specification::Document)
            .ok_or_else(|| RepositoryError::Malformed {
                id: id.to_owned(),
                reason: "specification not found in response".to_owned(),
            })
    }

    fn description(&self, id: &str) -> Result<Option<String>, RepositoryError> {
        let response: DescriptionResponse = self
            .get_json("get description", &format!("content/{id}?fields=description"))
            .map_err(self.wrap("get description"))?;
        Ok(response.default_description.or_else(|| {
            response
                .description
                .and_then(|value| value.as_str().map(str::to_owned))
        }))
    }

    fn content(&self, id: &str) -> Result<ContentItem, RepositoryError> {
        self.get_json("get content", &format!("content/{id}?fields=*"))
            .map_err(self.wrap("get content"))
    }

    fn copy_object(
        &self,
        source_id: &str,
        dest_folder_id: &str,
        recursive: bool,
    ) -> Result<String, RepositoryError> {
        let body = CopyRequest {
            source_id,
            destination_id: dest_folder_id,
            recursive,
        };
        let url = self.url("content/copy");
        let created: CreatedObject = self
            .send_json("copy", Method::POST, "content/copy", &body)
            .and_then(|response| parse_json(response, &url))
            .map_err(self.wrap("copy"))?;
        let new_id = created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| self.wrap("copy")(ApiError::MissingField { url, field: "id" }))?;
        info!("Object {source_id} copied to {dest_folder_id}, new ID: {new_id}");
        Ok(new_id)
    }

    fn update_object(&self, id: &str, update: &ObjectUpdate) -> Result<(), RepositoryError> {
        self.send_json("update", Method::PUT, &format!("content/{id}"), update)
            .map_err(self.wrap("update"))?;
        info!("Object {id} updated");
        Ok(())
    }

    fn update_module_definition(
        &self,
        id: &str,
        definition: &ModuleDefinition,
    ) -> Result<(), RepositoryError> {
        self.send_json("update module", Method::PUT, &format!("modules/{id}"), definition)
            .map_err(self.wrap("update module"))?;
        info!("Module spec {id} updated");
        Ok(())
    }

    fn create_module(
        &self,
        dest_folder_id: &str,
        definition: &ModuleDefinition,
    ) -> Result<Option<String>, RepositoryError> {
        let path = format!("modules?location={dest_folder_id}");
        let url = self.url(&path);
        let created: CreatedObject = self
            .send_json("create module", Method::POST, &path, definition)
            .and_then(|response| parse_json(response, &url))
            .map_err(self.wrap("create module"))?;
        Ok(created.id.filter(|id| !id.is_empty()))
    }
}
