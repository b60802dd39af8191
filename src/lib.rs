//! # docpass
//!
//! Pass long documents through a large-language-model service in bounded
//! chunks, resume replies the service could not finish, and reassemble the
//! pieces deterministically into one output file.
//!
//! docpass splits each input at natural boundaries (sentence ends for prose,
//! closing braces for code), sends every chunk in its own conversation,
//! follows up with "please continue" turns when the service runs out of
//! output budget, and writes the joined result only when every chunk
//! succeeded.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │ extract  │──▶│  chunk   │──▶│ continuation │──▶│  output   │
//! │ PDF/text │   │ splitter │   │  controller  │   │ atomic    │
//! └──────────┘   └──────────┘   └──────┬───────┘   └───────────┘
//!                                      │
//!                                      ▼
//!                               ┌──────────────┐
//!                               │  transform   │
//!                               │ OpenAI/Anth. │
//!                               └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docpass tasks                          # list built-in tasks
//! docpass split include/foo.h            # show chunk boundaries, no service calls
//! docpass run include/                   # annotate every header -> include_doxygen/
//! docpass --config paper.toml run paper.pdf   # clean a PDF -> paper_cleaned.txt
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`tokenize`] | Length estimators (chars, BPE tokens) |
//! | [`chunk`] | Boundary-aware splitting |
//! | [`conversation`] | Per-chunk turn history |
//! | [`transform`] | Service clients and completion protocols |
//! | [`continuation`] | Continuation loop and fragment assembly |
//! | [`tasks`] | Built-in task profiles |
//! | [`orchestrate`] | Document and directory pipeline |
//! | [`extract`] | Document loading, PDF text extraction |
//! | [`walk`] | Directory planning and mirroring |
//! | [`output`] | Output paths and atomic writes |
//! | [`progress`] | Progress reporting on stderr |
//! | [`commands`] | CLI command implementations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod continuation;
pub mod conversation;
pub mod extract;
pub mod models;
pub mod orchestrate;
pub mod output;
pub mod progress;
pub mod tasks;
pub mod tokenize;
pub mod transform;
pub mod walk;
