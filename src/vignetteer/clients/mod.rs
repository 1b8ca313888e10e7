// src/vignetteer/clients/mod.rs

pub mod openai;
