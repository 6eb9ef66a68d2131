//! Ingestion stage typestate: transitions are monotonic and the
//! compiler rejects skipping or reordering a stage.

use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Queued,
    states: [Queued, Parsing, Chunking, Embedding, Upserting, Completed, Failed],
    events {
        parse { transition: { from: Queued, to: Parsing } }
        chunk { transition: { from: Parsing, to: Chunking } }
        embed { transition: { from: Chunking, to: Embedding } }
        upsert { transition: { from: Embedding, to: Upserting } }
        complete {
            transition: { from: Embedding, to: Completed }
            transition: { from: Upserting, to: Completed }
        }
        fail {
            transition: { from: Queued, to: Failed }
            transition: { from: Parsing, to: Failed }
            transition: { from: Chunking, to: Failed }
            transition: { from: Embedding, to: Failed }
            transition: { from: Upserting, to: Failed }
        }
    }
}

pub fn ready() -> IngestionMachine<(), Queued> {
    IngestionMachine::new(())
}
