//! Pipeline stages for turning words into card images.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ llm ──▶ postprocess ──▶ render ──▶ capture ──▶ encode
//! (text)   (LLM)    (JSON→records)  (surface)  (resvg)    (PNG/ZIP)
//!                                      │
//!                                   layout (record → SVG)
//! ```
//!
//! 1. [`input`]: parse a hand-typed entry or a word list; validate
//! 2. [`llm`]: one enrichment call per batch; the only stage talking to
//!    a text-generation service
//! 3. [`postprocess`]: strip fences and invisible characters, parse and
//!    normalise the JSON array of records
//! 4. [`render`]: bind record + background onto the shared surface, with
//!    request tokens and a readiness channel
//! 5. [`layout`]: the card design, expressed as SVG
//! 6. [`capture`]: wait for readiness, rasterise in `spawn_blocking`
//! 7. [`encode`]: PNG encoding and ZIP packaging

pub mod capture;
pub mod encode;
pub mod input;
pub mod layout;
pub mod llm;
pub mod postprocess;
pub mod render;
