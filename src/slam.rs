use anyhow::Result;
use std::path::PathBuf;

use crate::data_uri;
use crate::frames::file_name;
use crate::transcript::{Content, Conversation, Part};

pub const SYSTEM_PROMPT: &str = "You are a vision language model being used for algorithm-free conceptual SLAM (Simultaneous Localization and Mapping).";

pub const INITIAL_PROMPT: &str = concat!(
    "I'm going to have you 'do SLAM' as a vision LLM, with no algorithmic help. ",
    "I just give you a series of pictures, and you make your own map and localize yourself within it. \n",
    "Assume that each new image is at maximum a few steps away from the last one, never a long distance.",
    "Be concise. Make your map conceptual instead of exact. i.e. \"the bush is a few steps north of the stone\" ",
    "is just fine, no need for exact measurements or directions. Think of yourself as a human orienting themself.",
    "Use distictive and descriptive names for things, because you might later see more that are very similar. ",
    "and have to name them as well.",
    "For each picture I give you, respond with: \n",
    "1. interesting new observations\n",
    "2. your latest map (however you choose to represent it), and \n",
    "3. your current pose within the map. \n",
    "Continue until I tell you we're finished.\n",
);

pub const BIRDS_EYE_VIEW_PROMPT: &str = "Now that you have processed all images, please provide a comprehensive birds-eye view map of the entire environment you explored, clearly indicating the path taken, key landmarks, and your final localized position. Represent this map in a way that is easy to visualize as a plot.";

/// Something that can answer the conversation so far.
///
/// `None` means the call failed for good and the run cannot continue.
pub trait Chat {
    async fn reply(&self, conversation: &Conversation) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Every frame was answered; `summary` is the bird's-eye view map if the
    /// model produced one.
    Completed {
        frames: usize,
        summary: Option<String>,
    },
    /// No reply for the 1-based `frame`; later frames were never sent.
    Halted { frame: usize },
}

pub async fn map_frames(
    chat: &impl Chat,
    frames: &[PathBuf],
    conversation: &mut Conversation,
) -> Result<Outcome> {
    println!("Prompt sent. Waiting for model's mapping responses…\n");

    for (index, frame) in frames.iter().enumerate() {
        let index = index + 1;
        let name = file_name(frame);

        let image = Part::image(data_uri::encode(frame).await?);
        let content = if index == 1 {
            vec![Part::text(INITIAL_PROMPT), image]
        } else {
            vec![image]
        };
        conversation.ask(Content::Parts(content));

        let Some(reply) = chat.reply(conversation).await else {
            println!("\nFailed to get a response for frame {index} ({name}). Halting.");
            return Ok(Outcome::Halted { frame: index });
        };

        println!("--- Frame {index}: {name} ---\n{reply}\n");
        conversation.answer(reply);
    }

    conversation.ask(Content::Text(BIRDS_EYE_VIEW_PROMPT.to_owned()));
    let summary = chat.reply(conversation).await;

    match &summary {
        Some(map) => {
            conversation.answer(map.clone());
            println!("\n--- Bird's Eye View Map ---\n");
            println!("{map}");
        }
        None => println!("\n--- Failed to get Bird's Eye View Map ---\n"),
    }

    Ok(Outcome::Completed {
        frames: frames.len(),
        summary,
    })
}
