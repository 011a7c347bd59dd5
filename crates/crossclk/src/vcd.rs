use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::kernel::SignalId;
use crate::time::TimeUnit;

/// Change-only value dump of the boundary signals in VCD format.
pub struct VcdWriter {
    writer: BufWriter<File>,
    ids: Vec<(SignalId, String, u32)>,
    last_values: HashMap<SignalId, u64>,
    timestamp: u64,
}

impl VcdWriter {
    pub fn new<P: AsRef<Path>>(
        path: P,
        precision: TimeUnit,
        signals: &[(String, u32, SignalId)],
    ) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        // VCD Header
        writeln!(writer, "$date")?;
        writeln!(
            writer,
            "  {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer, "$end")?;
        writeln!(writer, "$version")?;
        writeln!(writer, "  crossclk")?;
        writeln!(writer, "$end")?;
        writeln!(writer, "$timescale 1{} $end", precision)?;

        let mut ids = Vec::new();
        writeln!(writer, "$scope module tb $end")?;
        for (index, (name, width, signal)) in signals.iter().enumerate() {
            let vcd_id = Self::generate_vcd_id(index);
            writeln!(writer, "$var wire {} {} {} $end", width, vcd_id, name)?;
            ids.push((*signal, vcd_id, *width));
        }
        writeln!(writer, "$upscope $end")?;
        writeln!(writer, "$enddefinitions $end")?;
        writeln!(writer, "$dumpvars")?;
        writeln!(writer, "$end")?;

        Ok(Self {
            writer,
            ids,
            last_values: HashMap::new(),
            timestamp: 0,
        })
    }

    fn generate_vcd_id(num: usize) -> String {
        let mut id = String::new();
        let mut n = num;
        loop {
            let ch = ((n % 94) + 33) as u8 as char;
            id.push(ch);
            if n < 94 {
                break;
            }
            n = (n / 94) - 1;
        }
        id.chars().rev().collect()
    }

    pub fn dump(
        &mut self,
        timestamp: u64,
        get_val: impl Fn(SignalId) -> u64,
    ) -> std::io::Result<()> {
        if timestamp > self.timestamp || timestamp == 0 {
            writeln!(self.writer, "#{}", timestamp)?;
            self.timestamp = timestamp;
        }

        for (signal, vcd_id, width) in &self.ids {
            let current = get_val(*signal);
            if self.last_values.get(signal) != Some(&current) {
                if *width == 1 {
                    writeln!(self.writer, "{}{}", current, vcd_id)?;
                } else {
                    writeln!(self.writer, "b{:b} {}", current, vcd_id)?;
                }
                self.last_values.insert(*signal, current);
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_change_only_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.vcd");
        let signals = vec![
            ("clk".to_string(), 1, SignalId(0)),
            ("data".to_string(), 8, SignalId(1)),
        ];
        let mut writer = VcdWriter::new(&path, TimeUnit::Ps, &signals).unwrap();
        writer
            .dump(0, |id| if id == SignalId(0) { 1 } else { 0xAB })
            .unwrap();
        // Only clk changes; data must not be re-emitted.
        writer
            .dump(10, |id| if id == SignalId(0) { 0 } else { 0xAB })
            .unwrap();
        drop(writer);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("$timescale 1ps $end"));
        assert!(text.contains("$var wire 1 ! clk $end"));
        assert!(text.contains("$var wire 8 \" data $end"));
        assert!(text.contains("b10101011"));
        assert!(text.contains("#10"));
        assert_eq!(text.matches("b10101011").count(), 1);
    }

    #[test]
    fn id_allocation_covers_the_printable_range() {
        assert_eq!(VcdWriter::generate_vcd_id(0), "!");
        assert_eq!(VcdWriter::generate_vcd_id(93), "~");
        assert_eq!(VcdWriter::generate_vcd_id(94), "!!");
    }
}
