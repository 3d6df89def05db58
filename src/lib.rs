//! Survey follow-up bot: pain-point extraction and one follow-up question
//! per turn, backed by Gemini and a libSQL session store.

pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod survey;
