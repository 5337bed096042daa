use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::time::Duration;

use cscs_debugger::wire::{
    Command, ConnectionEvent, FileAssembler, FileChunk, ResponseAssembler, ResponseTag,
    TcpTransport, Transport, WireEnvelope,
};

#[cfg(test)]
mod framing_tests {
    use super::*;

    #[test]
    fn test_command_lines() {
        assert_eq!(Command::File("/w/a.cscs".to_string()).encode(), "file|/w/a.cscs\n");
        assert_eq!(Command::Next.encode(), "next|\n");
        assert_eq!(Command::StepIn.encode(), "stepin|\n");
        assert_eq!(Command::StepOut.encode(), "stepout|\n");
        assert_eq!(Command::DebugRepl("x".to_string()).encode(), "_repl|x\n");
        assert_eq!(
            Command::Repl("a = 1;\rb = 2;".to_string()).encode(),
            "repl|a = 1;\rb = 2;\n"
        );
    }

    #[test]
    fn test_setbp_without_lines_clears_file() {
        let cmd = Command::SetBreakpoints {
            file: "/srv/a.cscs".to_string(),
            lines: Vec::new(),
        };
        assert_eq!(cmd.encode(), "setbp|/srv/a.cscs\n");
    }

    #[test]
    fn test_response_tags() {
        assert_eq!(ResponseTag::parse("next"), ResponseTag::Next);
        assert_eq!(ResponseTag::parse("_repl"), ResponseTag::DebugRepl);
        assert_eq!(ResponseTag::parse("exc\r"), ResponseTag::Exception);
        assert_eq!(ResponseTag::parse("send_file"), ResponseTag::SendFile);
    }

    #[test]
    fn test_unprefixed_chunk_passes_through() {
        let mut assembler = ResponseAssembler::new();
        let frame = assembler.push(b"vars\n0\n").expect("complete frame");
        assert_eq!(frame, b"vars\n0\n");
        assert!(!assembler.is_collecting());
    }

    #[test]
    fn test_length_prefixed_response_is_reassembled() {
        let mut assembler = ResponseAssembler::new();
        assert!(assembler.push(b"21\nvars\n1\n").is_none());
        assert!(assembler.is_collecting());
        assert_eq!(assembler.progress(), (7, 21));

        let frame = assembler.push(b"x:0:number:42\n").expect("complete frame");
        assert_eq!(frame, b"vars\n1\nx:0:number:42\n");
        assert!(!assembler.is_collecting());

        // The next chunk starts a fresh response.
        assert_eq!(assembler.push(b"end\n").unwrap(), b"end\n");
    }

    #[test]
    fn test_file_transfer_in_one_frame() {
        let mut files = FileAssembler::new();
        match files.begin(b"send_file\n5\nout.txt\nhello") {
            FileChunk::Complete(file) => {
                assert_eq!(file.filename, "out.txt");
                assert_eq!(file.bytes, b"hello");
            }
            other => panic!("expected complete transfer, got {:?}", other),
        }
        assert!(!files.is_active());
    }

    #[test]
    fn test_file_transfer_across_frames() {
        let mut files = FileAssembler::new();
        assert!(matches!(files.begin(b"send_file\n10\nout.bin\nhel"), FileChunk::Pending));
        assert!(files.is_active());
        assert!(matches!(files.push(b"lo wo"), FileChunk::Pending));

        match files.push(b"rld and more") {
            FileChunk::Complete(file) => assert_eq!(file.bytes, b"hello world"[..10].to_vec()),
            other => panic!("expected complete transfer, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_file_completes_immediately() {
        let mut files = FileAssembler::new();
        assert!(matches!(
            files.begin(b"send_file\n0\nempty.txt\n"),
            FileChunk::Complete(ref file) if file.bytes.is_empty()
        ));
    }

    #[test]
    fn test_file_transfer_without_name_is_malformed() {
        let mut files = FileAssembler::new();
        assert!(matches!(files.begin(b"send_file\n5"), FileChunk::Malformed));
        assert!(!files.is_active());
    }
}

#[cfg(test)]
mod transport_tests {
    use super::*;

    fn recv(rx: &mpsc::Receiver<WireEnvelope>) -> WireEnvelope {
        rx.recv_timeout(Duration::from_secs(5))
            .expect("transport event within timeout")
    }

    #[test]
    fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let mut writer = stream;
            writer.write_all(b"repl\n3\n").unwrap();
            line
        });

        let (tx, rx) = mpsc::channel::<WireEnvelope>();
        let mut transport = TcpTransport::new(tx);
        transport.connect(7, "127.0.0.1", port, Duration::from_secs(2));

        let connected = recv(&rx);
        assert_eq!(connected.instance, 7);
        assert_eq!(connected.event, ConnectionEvent::Connected);

        transport
            .write(Command::Repl("1 + 2".to_string()).encode().as_bytes())
            .unwrap();
        assert_eq!(server.join().unwrap(), "repl|1 + 2\n");

        let mut received = Vec::new();
        loop {
            match recv(&rx).event {
                ConnectionEvent::Data(bytes) => received.extend(bytes),
                ConnectionEvent::Closed => break,
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(received, b"repl\n3\n");

        transport.shutdown();
        assert!(transport.write(b"bye|\n").is_err());
    }

    #[test]
    fn test_refused_connection_reports_closed() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let (tx, rx) = mpsc::channel::<WireEnvelope>();
        let mut transport = TcpTransport::new(tx);
        transport.connect(3, "", port, Duration::from_secs(2));

        let mut events = Vec::new();
        loop {
            let envelope = recv(&rx);
            assert_eq!(envelope.instance, 3);
            let done = envelope.event == ConnectionEvent::Closed;
            events.push(envelope.event);
            if done {
                break;
            }
        }
        assert!(!events.contains(&ConnectionEvent::Connected));
    }

    #[test]
    fn test_write_before_connect_fails() {
        let (tx, _rx) = mpsc::channel::<WireEnvelope>();
        let mut transport = TcpTransport::new(tx);
        assert!(transport.write(b"next|\n").is_err());
    }
}
