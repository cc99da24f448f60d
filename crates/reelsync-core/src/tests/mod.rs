mod progress;
mod recorder;
mod support;
mod writer;
