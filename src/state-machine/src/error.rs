use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("invalid transition: cannot apply {event} while cycle is {from:?}")]
    InvalidTransition { from: common::CycleStatus, event: &'static str },

    #[error("no active cycle")]
    NoActiveCycle,
}
