//! HTTP relay in front of a hosted segmentation/detection model.
//!
//! The relay accepts multipart uploads from the browser, stages the media in a
//! temporary file, invokes a named operation on a remote Gradio endpoint and
//! returns the normalized result as JSON. Result media can be re-fetched
//! through [`proxy`] so the access token never reaches the browser.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vision_relay::{AppState, GradioClient, RelayConfig, router};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::from_env();
//! let backend = Arc::new(GradioClient::new(&config)?);
//! let app = router(AppState::new(config, backend));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod detections;
pub mod error;
pub mod gradio;
pub mod messages;
pub mod normalize;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod upload;

pub use backend::{InferenceBackend, RemoteArg, RemoteCall, RemoteOperation};
pub use config::RelayConfig;
pub use detections::{Detection, parse_detections};
pub use error::{ApiError, RelayError, RemoteError};
pub use gradio::GradioClient;
pub use normalize::{MediaRef, RemotePayload};
pub use server::{AppState, router};
pub use upload::{StagedFile, UploadForm, UploadedFile};
