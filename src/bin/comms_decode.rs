use anyhow::Context;
use commskit::dump::{dump_message, summary_line};
use commskit::{Engine, MessageClass, ReaderConfig};
use pcap_parser::pcapng::Block as PcapNgBlock;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::{Linktype, PcapBlockOwned, PcapError};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Counts {
    packets: u64,
    payloads: u64,
    regular: u64,
    raw: u64,
    invalid: u64,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    match args.iter().position(|a| names.contains(&a.as_str())) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn take_value(args: &mut Vec<String>, name: &str) -> anyhow::Result<Option<String>> {
    let prefix = format!("{}=", name);
    if let Some(pos) = args.iter().position(|a| a.starts_with(&prefix)) {
        let arg = args.remove(pos);
        return Ok(arg.strip_prefix(&prefix).map(str::to_string));
    }
    match args.iter().position(|a| a == name) {
        Some(pos) if pos + 1 < args.len() => {
            args.remove(pos);
            Ok(Some(args.remove(pos)))
        }
        Some(_) => anyhow::bail!("{} needs a value", name),
        None => Ok(None),
    }
}

fn main() -> anyhow::Result<()> {
    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = take_flag(&mut raw_args, &["--verbose", "-v"]);
    let summary = take_flag(&mut raw_args, &["--summary", "-s"]);
    let pcap = take_flag(&mut raw_args, &["--pcap"]);
    let chunk: usize = match take_value(&mut raw_args, "--chunk")? {
        Some(s) => s.parse().context("--chunk expects a byte count")?,
        None => 4096,
    };
    let max_garbage: Option<usize> = take_value(&mut raw_args, "--max-garbage")?
        .map(|s| s.parse())
        .transpose()
        .context("--max-garbage expects a byte count")?;
    init_logging(verbose);

    let mut args = raw_args.into_iter();
    let (Some(dsl_path), Some(input_path)) = (args.next().map(PathBuf::from), args.next().map(PathBuf::from)) else {
        anyhow::bail!(
            "usage: comms_decode <protocol.dsl> <input> [--pcap] [--chunk N] [--max-garbage N] [--summary] [--verbose]"
        );
    };

    let src = std::fs::read_to_string(&dsl_path)
        .with_context(|| format!("reading {}", dsl_path.display()))?;
    let mut engine = Engine::from_dsl(&src).map_err(|e| anyhow::anyhow!(e))?;
    if let Some(max_garbage_len) = max_garbage {
        engine = engine.with_config(ReaderConfig { max_garbage_len });
    }

    let mut counts = Counts::default();
    let chunk = chunk.max(1);
    let feed = |engine: &mut Engine, counts: &mut Counts, bytes: &[u8], is_final: bool| {
        let mut pieces = bytes.chunks(chunk).peekable();
        if pieces.peek().is_none() {
            report(engine.read_data(&[], is_final), counts, summary);
        }
        while let Some(piece) = pieces.next() {
            let last = pieces.peek().is_none();
            report(engine.read_data(piece, is_final && last), counts, summary);
        }
    };

    if pcap {
        let mut probe = [0u8; 4];
        {
            let mut f = File::open(&input_path)?;
            f.read_exact(&mut probe)?;
        }
        let file = File::open(&input_path)?;
        let mut on_payload = |payload: &[u8]| {
            counts.payloads += 1;
            feed(&mut engine, &mut counts, payload, false);
        };
        let mut packets = 0;
        if probe == [0x0a, 0x0d, 0x0d, 0x0a] {
            run_pcapng(file, &mut packets, &mut on_payload)?;
        } else {
            run_legacy_pcap(file, &mut packets, &mut on_payload)?;
        }
        counts.packets = packets;
        feed(&mut engine, &mut counts, &[], true);
    } else {
        let bytes = std::fs::read(&input_path)
            .with_context(|| format!("reading {}", input_path.display()))?;
        feed(&mut engine, &mut counts, &bytes, true);
    }

    eprintln!("protocol: {} ({})", engine.name(), dsl_path.display());
    eprintln!("input:    {}", input_path.display());
    if pcap {
        eprintln!("packets: {}", counts.packets);
        eprintln!("payloads: {}", counts.payloads);
    }
    eprintln!("messages: {}", counts.regular);
    eprintln!("raw data (unknown id): {}", counts.raw);
    eprintln!("invalid (garbage / checksum): {}", counts.invalid);
    Ok(())
}

fn report(msgs: Vec<commskit::Message>, counts: &mut Counts, summary: bool) {
    for msg in msgs {
        match msg.class() {
            MessageClass::Regular => counts.regular += 1,
            MessageClass::RawData => counts.raw += 1,
            MessageClass::Invalid(_) => counts.invalid += 1,
        }
        if summary {
            println!("{}", summary_line(&msg));
        } else {
            print!("{}", dump_message(&msg));
        }
    }
}

fn run_legacy_pcap<R: Read>(
    file: R,
    packets: &mut u64,
    on_payload: &mut dyn FnMut(&[u8]),
) -> anyhow::Result<()> {
    let mut reader = pcap_parser::pcap::LegacyPcapReader::new(1 << 20, file)?;
    let mut linktype: Option<Linktype> = None;
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(h) => linktype = Some(h.network),
                    PcapBlockOwned::Legacy(b) => {
                        *packets += 1;
                        let lt = linktype.unwrap_or(Linktype(1));
                        if let Some(payload) = transport_payload(lt, b.data) {
                            on_payload(payload);
                        }
                    }
                    PcapBlockOwned::NG(_) => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow::anyhow!("pcap refill error: {:?}", e))?;
            }
            Err(e) => return Err(anyhow::anyhow!("pcap read error: {:?}", e)),
        }
    }
    Ok(())
}

fn run_pcapng<R: Read>(
    file: R,
    packets: &mut u64,
    on_payload: &mut dyn FnMut(&[u8]),
) -> anyhow::Result<()> {
    let mut reader = pcap_parser::pcapng::PcapNGReader::new(1 << 20, file)?;
    let mut if_linktypes: Vec<Linktype> = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::NG(b) = block {
                    let packet = match &b {
                        PcapNgBlock::InterfaceDescription(idb) => {
                            if_linktypes.push(idb.linktype);
                            None
                        }
                        PcapNgBlock::EnhancedPacket(epb) => Some((
                            if_linktypes
                                .get(epb.if_id as usize)
                                .copied()
                                .unwrap_or(Linktype(1)),
                            epb.packet_data(),
                        )),
                        PcapNgBlock::SimplePacket(spb) => Some((
                            if_linktypes.first().copied().unwrap_or(Linktype(1)),
                            spb.packet_data(),
                        )),
                        _ => None,
                    };
                    if let Some((lt, data)) = packet {
                        *packets += 1;
                        if let Some(payload) = transport_payload(lt, data) {
                            on_payload(payload);
                        }
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow::anyhow!("pcapng refill error: {:?}", e))?;
            }
            Err(e) => return Err(anyhow::anyhow!("pcapng read error: {:?}", e)),
        }
    }
    Ok(())
}

fn transport_payload(linktype: Linktype, frame: &[u8]) -> Option<&[u8]> {
    let l3 = match linktype.0 {
        1 => ethernet_l3(frame)?,    // DLT_EN10MB
        101 => frame,                // DLT_RAW
        113 => linux_sll_l3(frame)?, // DLT_LINUX_SLL
        _ => return None,
    };
    ipv4_payload(l3)
}

fn ethernet_l3(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < 14 {
        return None;
    }
    let mut off = 12usize;
    let mut ethertype = u16::from_be_bytes([frame[off], frame[off + 1]]);
    off += 2;
    // 802.1Q / 802.1ad tags
    while ethertype == 0x8100 || ethertype == 0x88a8 {
        if frame.len() < off + 4 + 2 {
            return None;
        }
        off += 4;
        ethertype = u16::from_be_bytes([frame[off], frame[off + 1]]);
        off += 2;
    }
    match ethertype {
        0x0800 => Some(&frame[off..]),
        _ => None,
    }
}

fn linux_sll_l3(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < 16 {
        return None;
    }
    match u16::from_be_bytes([frame[14], frame[15]]) {
        0x0800 => Some(&frame[16..]),
        _ => None,
    }
}

/// UDP or TCP payload of an IPv4 packet.
fn ipv4_payload(l3: &[u8]) -> Option<&[u8]> {
    if l3.len() < 20 || l3[0] >> 4 != 4 {
        return None;
    }
    let ihl = (l3[0] & 0x0f) as usize * 4;
    if ihl < 20 || l3.len() < ihl {
        return None;
    }
    let total_len = u16::from_be_bytes([l3[2], l3[3]]) as usize;
    if total_len < ihl {
        return None;
    }
    let l3 = if total_len <= l3.len() { &l3[..total_len] } else { l3 };
    let l4 = &l3[ihl..];
    match l3[9] {
        17 => {
            if l4.len() < 8 {
                return None;
            }
            let udp_len = u16::from_be_bytes([l4[4], l4[5]]) as usize;
            if udp_len < 8 || l4.len() < udp_len {
                return None;
            }
            Some(&l4[8..udp_len])
        }
        6 => {
            if l4.len() < 20 {
                return None;
            }
            let data_off = (l4[12] >> 4) as usize * 4;
            if data_off < 20 || l4.len() < data_off {
                return None;
            }
            Some(&l4[data_off..])
        }
        _ => None,
    }
}
