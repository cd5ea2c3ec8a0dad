//! A development engine that evaluates Bristol-format circuits on revealed
//! inputs.
//!
//! [`ClearEngine`] implements the [`Engine`] contract without any
//! cryptography: every party broadcasts its input bits, evaluates the
//! circuit locally, and cross-checks the result with its ring neighbor. It
//! reveals all inputs to all parties and must never be used where privacy
//! matters; it exists to exercise the transport plumbing end-to-end and as a
//! drop-in stand-in while integrating a real garbled-circuit engine.

use crate::channel::Tag;
use crate::engine::{Engine, EngineError, EngineIo, Job};

/// The insecure reveal-and-evaluate engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearEngine;

impl Engine for ClearEngine {
    fn run_two_party(&self, job: &Job, io: &mut dyn EngineIo) -> Result<Vec<u8>, EngineError> {
        if job.size != 2 {
            return Err(EngineError::InvalidJob(format!(
                "two-party entry point invoked with size {}",
                job.size
            )));
        }
        evaluate(job, io)
    }

    fn run_multi_party(&self, job: &Job, io: &mut dyn EngineIo) -> Result<Vec<u8>, EngineError> {
        evaluate(job, io)
    }
}

fn evaluate(job: &Job, io: &mut dyn EngineIo) -> Result<Vec<u8>, EngineError> {
    if job.party >= job.size {
        return Err(EngineError::InvalidJob(format!(
            "party {} out of range for size {}",
            job.party, job.size
        )));
    }
    if job.input_bits_per_party.len() != job.size {
        return Err(EngineError::InvalidJob(format!(
            "input bit table has {} entries for {} parties",
            job.input_bits_per_party.len(),
            job.size
        )));
    }
    if job.input_bits.len() != job.input_bits_per_party[job.party] {
        return Err(EngineError::InvalidJob(format!(
            "party {} provided {} input bits, expected {}",
            job.party,
            job.input_bits.len(),
            job.input_bits_per_party[job.party]
        )));
    }
    let circuit = Circuit::parse(&job.circuit)?;
    let total: usize = job.input_bits_per_party.iter().sum();
    if total != circuit.inputs {
        return Err(EngineError::InvalidJob(format!(
            "parties provide {total} input bits but the circuit expects {}",
            circuit.inputs
        )));
    }

    // Reveal phase: everyone sends its own bits to everyone else, then
    // collects the other segments. Sends never block, so the fixed receive
    // order cannot deadlock.
    if !job.input_bits.is_empty() {
        for to in 0..job.size {
            if to != job.party {
                io.send(to, Tag::A, &job.input_bits)?;
            }
        }
    }
    let mut joint = Vec::with_capacity(circuit.inputs);
    for from in 0..job.size {
        let len = job.input_bits_per_party[from];
        if from == job.party {
            joint.extend_from_slice(&job.input_bits);
        } else if len > 0 {
            joint.extend_from_slice(&io.recv(from, Tag::A, len)?);
        }
    }

    io.state("inputs shared");
    let output = circuit.eval(&joint)?;
    io.state("circuit evaluated");

    // Agreement phase: cross-check the result around the ring so a diverging
    // evaluation surfaces as an engine failure instead of a wrong answer.
    if job.size > 1 {
        let next = (job.party + 1) % job.size;
        let prev = (job.party + job.size - 1) % job.size;
        io.send(next, Tag::B, &output)?;
        let echoed = io.recv(prev, Tag::B, output.len())?;
        if echoed != output {
            return Err(EngineError::Failed(
                "parties disagree on the circuit output".into(),
            ));
        }
    }

    Ok(output)
}

/// A parsed Bristol-format boolean circuit.
///
/// Header: one line `gates wires`, one line of input segment widths followed
/// by the output width. Gates are `XOR`/`AND`/`INV` lines; outputs are the
/// final wires.
#[derive(Debug)]
struct Circuit {
    wires: usize,
    inputs: usize,
    outputs: usize,
    gates: Vec<Gate>,
}

#[derive(Debug, Clone, Copy)]
enum Gate {
    Xor(usize, usize, usize),
    And(usize, usize, usize),
    Inv(usize, usize),
}

impl Circuit {
    fn parse(text: &str) -> Result<Circuit, EngineError> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| EngineError::Circuit("missing header line".into()))?;
        let mut header = header.split_whitespace();
        let gate_count = parse_number(header.next(), "gate count")?;
        let wires = parse_number(header.next(), "wire count")?;

        let widths = lines
            .next()
            .ok_or_else(|| EngineError::Circuit("missing input/output widths".into()))?;
        let widths: Vec<usize> = widths
            .split_whitespace()
            .map(|w| parse_number(Some(w), "width"))
            .collect::<Result<_, _>>()?;
        let (&outputs, input_widths) = widths
            .split_last()
            .ok_or_else(|| EngineError::Circuit("empty input/output widths".into()))?;
        let inputs: usize = input_widths.iter().sum();
        if inputs + outputs > wires {
            return Err(EngineError::Circuit(format!(
                "{inputs} input and {outputs} output wires exceed {wires} total"
            )));
        }

        let mut gates = Vec::with_capacity(gate_count);
        for line in lines {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let gate = match fields.as_slice() {
                ["2", "1", a, b, out, op] => {
                    let a = wire(a, wires)?;
                    let b = wire(b, wires)?;
                    let out = wire(out, wires)?;
                    match *op {
                        "XOR" => Gate::Xor(a, b, out),
                        "AND" => Gate::And(a, b, out),
                        other => {
                            return Err(EngineError::Circuit(format!(
                                "unsupported binary gate {other}"
                            )));
                        }
                    }
                }
                ["1", "1", a, out, "INV"] => Gate::Inv(wire(a, wires)?, wire(out, wires)?),
                _ => return Err(EngineError::Circuit(format!("malformed gate line: {line}"))),
            };
            gates.push(gate);
        }
        if gates.len() != gate_count {
            return Err(EngineError::Circuit(format!(
                "expected {gate_count} gates, found {}",
                gates.len()
            )));
        }

        Ok(Circuit {
            wires,
            inputs,
            outputs,
            gates,
        })
    }

    fn eval(&self, inputs: &[u8]) -> Result<Vec<u8>, EngineError> {
        if inputs.len() != self.inputs {
            return Err(EngineError::Circuit(format!(
                "expected {} input bits, got {}",
                self.inputs,
                inputs.len()
            )));
        }
        let mut wires = vec![0u8; self.wires];
        for (wire, bit) in wires.iter_mut().zip(inputs) {
            *wire = bit & 1;
        }
        for gate in &self.gates {
            match *gate {
                Gate::Xor(a, b, out) => wires[out] = wires[a] ^ wires[b],
                Gate::And(a, b, out) => wires[out] = wires[a] & wires[b],
                Gate::Inv(a, out) => wires[out] = wires[a] ^ 1,
            }
        }
        Ok(wires[self.wires - self.outputs..].to_vec())
    }
}

fn parse_number(field: Option<&str>, what: &str) -> Result<usize, EngineError> {
    field
        .ok_or_else(|| EngineError::Circuit(format!("missing {what}")))?
        .parse()
        .map_err(|_| EngineError::Circuit(format!("invalid {what}")))
}

fn wire(field: &str, wires: usize) -> Result<usize, EngineError> {
    let index: usize = field
        .parse()
        .map_err(|_| EngineError::Circuit(format!("invalid wire index {field}")))?;
    if index >= wires {
        return Err(EngineError::Circuit(format!(
            "wire index {index} out of range for {wires} wires"
        )));
    }
    Ok(index)
}
