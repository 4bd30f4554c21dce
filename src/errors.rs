//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`KilnError`] covers the failure modes that are
//! surfaced to callers:
//! - Backend resource creation failures (buffers, textures, programs)
//! - Shader assembly failures
//! - Material contract violations detected while binding a draw call
//! - Persistence (state reconstruction) failures
//!
//! Usage errors such as attaching a node to itself or adding a duplicate
//! component are *not* represented here. Those operations log a diagnostic
//! and report failure through their `bool`/`Option` return value.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kiln::errors::{KilnError, Result};
//!
//! fn build() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the Kiln engine.
#[derive(Error, Debug)]
pub enum KilnError {
    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// The backend refused to allocate a buffer object.
    #[error("Failed to create GPU buffer: {0}")]
    BufferCreation(String),

    /// The backend refused to allocate a texture object.
    #[error("Failed to create GPU texture: {0}")]
    TextureCreation(String),

    /// Shader compilation or program linking failed.
    #[error("Failed to link shader program: {log}")]
    ProgramLink {
        /// Info log reported by the backend
        log: String,
    },

    // ========================================================================
    // Shader Assembly Errors
    // ========================================================================
    /// A shader source has no `void main` entry point to splice into.
    #[error("Shader source has no `void main` entry point ({stage} stage)")]
    ShaderSource {
        /// "vertex" or "fragment"
        stage: &'static str,
    },

    /// Prelude template rendering failed.
    #[error("Shader template error: {0}")]
    Template(#[from] minijinja::Error),

    // ========================================================================
    // Material Contract Errors
    // ========================================================================
    /// The compiled program declares a custom uniform the material does not supply.
    #[error("Material '{material}' was not given a uniform named '{uniform}'")]
    MissingUniform {
        /// Material name
        material: String,
        /// Uniform name declared by the program
        uniform: String,
    },

    /// Sprite materials must supply a `diffuseMap` texture.
    #[error("Sprite material '{0}' requires a diffuseMap texture")]
    SpriteWithoutDiffuseMap(String),

    /// A component references an asset handle that no longer exists.
    #[error("Missing asset: {0}")]
    MissingAsset(String),

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// No constructor is registered for the persisted component tag.
    #[error("Unknown component type tag: {0}")]
    UnknownComponentTag(String),

    /// An entity a persistence or prefab operation starts from is not present.
    #[error("Entity not found: {0}")]
    MissingEntity(String),

    /// Component state could not be decoded.
    #[error("Invalid component state: {0}")]
    State(#[from] serde_json::Error),
}

/// Alias for `Result<T, KilnError>`.
pub type Result<T> = std::result::Result<T, KilnError>;
