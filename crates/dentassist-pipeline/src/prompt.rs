// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt composition for SmartNote generation.
//!
//! Prompts use the Llama-3 Instruct chat template. The model expects this
//! exact token structure; without it, instruction following degrades badly.
//! `<|begin_of_text|>` is added by the runtime as BOS and must NOT appear in
//! the prompt string.

/// Clinical instructions for SmartNote synthesis, in the practice language.
const SMARTNOTE_SYSTEM: &str = "\
Tu es un assistant de documentation clinique pour chirurgiens-dentistes. \
À partir de la transcription d'une consultation, rédige une SmartNote \
structurée en français avec les sections suivantes, dans cet ordre :\n\
MOTIF DE CONSULTATION\nEXAMEN CLINIQUE\nDIAGNOSTIC\nTRAITEMENT RÉALISÉ\n\
PRESCRIPTIONS\nSUIVI\n\
Règles : reste strictement fidèle à la transcription, ne jamais inventer \
d'acte ni de prescription ; utilise la notation dentaire FDI ; les sections \
sans information portent la mention « non renseigné » ; style télégraphique \
professionnel, pas de formule de politesse.";

/// Builds a Llama-3 Instruct chat-formatted prompt.
fn llama3_prompt(system: &str, user: &str) -> String {
    format!(
        "<|start_header_id|>system<|end_header_id|>\n\n{system}<|eot_id|>\
         <|start_header_id|>user<|end_header_id|>\n\n{user}<|eot_id|>\
         <|start_header_id|>assistant<|end_header_id|>\n\n"
    )
}

/// Prompt for the plain (non-RAG) SmartNote path.
pub fn smartnote_prompt(transcription: &str) -> String {
    llama3_prompt(
        SMARTNOTE_SYSTEM,
        &format!("Transcription de la consultation :\n{transcription}"),
    )
}

/// Prompt for the RAG path: retrieved passages under a delimited reference
/// section, then the transcription.
///
/// Falls back to the plain prompt when no passages were retrieved.
pub fn rag_smartnote_prompt(transcription: &str, passages: &[String]) -> String {
    if passages.is_empty() {
        return smartnote_prompt(transcription);
    }
    let references = passages.join("\n\n");
    llama3_prompt(
        SMARTNOTE_SYSTEM,
        &format!(
            "Références cliniques (à utiliser uniquement si pertinentes) :\n\
             --- DÉBUT RÉFÉRENCES ---\n{references}\n--- FIN RÉFÉRENCES ---\n\n\
             Transcription de la consultation :\n{transcription}"
        ),
    )
}
