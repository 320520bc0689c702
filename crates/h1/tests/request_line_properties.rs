use bytes::BytesMut;
use http::Version;
use micro_h1::codec::HeaderDecoder;
use micro_h1::config::EngineConfig;
use micro_h1::pool::RequestBuffers;
use micro_h1::protocol::Request;
use proptest::prelude::*;
use tokio_util::codec::Decoder;

fn version_token() -> impl Strategy<Value = (&'static str, Version)> {
    prop_oneof![
        Just(("HTTP/1.1", Version::HTTP_11)),
        Just(("HTTP/1.0", Version::HTTP_10)),
        Just(("HTTP/1.7", Version::HTTP_11)),
        Just(("HTTP/0.9", Version::HTTP_09)),
        Just(("HTTP/1", Version::HTTP_09)),
        Just(("FTP/1.1", Version::HTTP_09)),
    ]
}

proptest! {
    #[test]
    fn request_line_is_recovered(
        method in "[A-Z]{1,12}",
        uri in "/[A-Za-z0-9/._~%-]{0,60}(\\?[a-z0-9=&]{0,20})?",
        (token, version) in version_token(),
        split in 0usize..128,
    ) {
        let input = format!("{method} {uri} {token}\r\nHost: example.com\r\n\r\n");
        let mut buffers = RequestBuffers::new(&EngineConfig::default());

        // the head arrives in two reads
        let split = split.min(input.len());
        let mut src = BytesMut::from(&input.as_bytes()[..split]);
        let mut decoder = HeaderDecoder::new(&mut buffers, 64 * 1024);
        let head = match decoder.decode(&mut src).unwrap() {
            Some(head) => head,
            None => {
                src.extend_from_slice(&input.as_bytes()[split..]);
                decoder.decode(&mut src).unwrap().unwrap()
            }
        };

        let request = Request::new(&head, &buffers);
        prop_assert_eq!(request.method_bytes(), method.as_bytes());
        prop_assert_eq!(request.uri(), uri.as_bytes());
        prop_assert_eq!(request.version(), version);
        if version == Version::HTTP_09 {
            prop_assert_eq!(request.header_count(), 0);
        } else {
            prop_assert!(src.is_empty());
            prop_assert_eq!(request.host().unwrap(), "example.com");
        }
    }

    #[test]
    fn missing_version_is_http09(method in "[A-Z]{1,12}", uri in "/[a-z0-9/]{0,30}") {
        let input = format!("{method} {uri}\r\n");
        let mut buffers = RequestBuffers::new(&EngineConfig::default());
        let mut src = BytesMut::from(input.as_bytes());

        let head = HeaderDecoder::new(&mut buffers, 64 * 1024).decode(&mut src).unwrap().unwrap();
        let request = Request::new(&head, &buffers);
        prop_assert_eq!(request.method_bytes(), method.as_bytes());
        prop_assert_eq!(request.uri(), uri.as_bytes());
        prop_assert_eq!(request.version(), Version::HTTP_09);
    }
}
