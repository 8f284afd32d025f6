mod greeting_parse {
    use tokio_test::io;

    use super::super::*;
    use crate::socks::{decode, Error};

    #[tokio::test]
    async fn error_if_wrong_version() {
        let mut stream = io::Builder::new().read(&[0x04_u8]).build();

        let req_res = Greeting::decode_from(&mut stream).await;

        assert!(matches!(
            req_res,
            Err(Error::MalformedFrame(Malformed::Version(4)))
        ));
    }

    #[tokio::test]
    async fn parse_no_auth_options() {
        let mut stream = io::Builder::new().read(&[VERSION]).read(&[0x00_u8]).build();

        let req = Greeting::decode_from(&mut stream).await.unwrap();

        assert!(req.methods().is_empty());
    }

    #[tokio::test]
    async fn parse_single_auth_options() {
        let mut stream = io::Builder::new()
            .read(&[VERSION])
            .read(&[0x01_u8])
            .read(&[AUTH_NOT_REQUIRED])
            .build();

        let req = Greeting::decode_from(&mut stream).await.unwrap();

        assert_eq!(req.methods(), &[AuthMethod::NoAuth]);
    }

    #[tokio::test]
    async fn parse_multiple_auth_options() {
        let mut stream = io::Builder::new()
            .read(&[VERSION])
            .read(&[0x03_u8])
            .read(&[AUTH_NOT_REQUIRED, AUTH_GSSAPI, AUTH_USER_PASS])
            .build();

        let req = Greeting::decode_from(&mut stream).await.unwrap();

        assert_eq!(
            req.methods(),
            &[AuthMethod::NoAuth, AuthMethod::Gssapi, AuthMethod::UserPass]
        );
    }

    #[test]
    fn unknown_methods_are_ignored() {
        let req = decode::<Greeting>(&[VERSION, 3, 0x80, AUTH_USER_PASS, 0x03]).unwrap();

        assert_eq!(req.methods(), &[AuthMethod::UserPass]);
    }

    #[test]
    fn every_other_version_is_malformed() {
        for ver in (0..=255_u8).filter(|v| *v != VERSION) {
            let res = decode::<Greeting>(&[ver, 1, AUTH_NOT_REQUIRED]);

            assert!(
                matches!(res, Err(Error::MalformedFrame(Malformed::Version(v))) if v == ver),
                "version {ver}"
            );
        }
    }

    #[test]
    fn short_greeting_is_truncated() {
        let res = decode::<Greeting>(&[VERSION, 2, AUTH_NOT_REQUIRED]);

        assert!(matches!(
            res,
            Err(Error::MalformedFrame(Malformed::Truncated))
        ));
    }

    #[test]
    fn encode_drops_duplicates() {
        let greeting = Greeting::new([
            AuthMethod::NoAuth,
            AuthMethod::UserPass,
            AuthMethod::NoAuth,
        ]);

        assert_eq!(greeting.encode(), vec![VERSION, 2, 0x00, 0x02]);
    }
}

mod method_selection {
    use super::super::*;
    use crate::socks::{decode, Error};

    #[test]
    fn no_acceptable_method() {
        let selection = MethodSelection::no_acceptable();

        assert_eq!(selection.encode(), vec![VERSION, AUTH_NONE]);
        assert_eq!(decode::<MethodSelection>(&[VERSION, AUTH_NONE]).unwrap().method(), None);
    }

    #[test]
    fn selected_method() {
        let selection = decode::<MethodSelection>(&[VERSION, AUTH_USER_PASS]).unwrap();

        assert_eq!(selection.method(), Some(AuthMethod::UserPass));
    }

    #[test]
    fn every_other_version_is_malformed() {
        for ver in (0..=255_u8).filter(|v| *v != VERSION) {
            assert!(
                matches!(
                    decode::<MethodSelection>(&[ver, AUTH_NOT_REQUIRED]),
                    Err(Error::MalformedFrame(Malformed::Version(v))) if v == ver
                ),
                "version {ver}"
            );
        }
    }

    #[test]
    fn unknown_method_is_malformed() {
        assert!(matches!(
            decode::<MethodSelection>(&[VERSION, 0x42]),
            Err(Error::MalformedFrame(Malformed::Method(0x42)))
        ));
    }
}

mod request_parse {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use tokio_test::io;

    use super::super::*;
    use crate::socks::{decode, Error, Host};

    #[tokio::test]
    async fn parse_connect_ipv4() {
        let mut stream = io::Builder::new()
            .read(&[VERSION, CMD_CONNECT, 0x00, ATYPE_IPV4])
            .read(&[192, 168, 1, 1])
            .read(&[0x07, 0xD1])
            .build();

        let req = Request::decode_from(&mut stream).await.unwrap();

        assert_eq!(req.command(), Command::Connect);
        assert_eq!(req.destination().host(), &Host::Ipv4(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(req.destination().port(), 2001);
    }

    #[tokio::test]
    async fn parse_bind_ipv6() {
        let ip = [32, 1, 13, 184, 0, 0, 0, 0, 0, 19, 21, 81, 1, 51, 0, 1];
        let mut stream = io::Builder::new()
            .read(&[VERSION, CMD_BIND, 0x00, ATYPE_IPV6])
            .read(&ip)
            .read(&[0x04, 0x38])
            .build();

        let req = Request::decode_from(&mut stream).await.unwrap();

        assert_eq!(req.command(), Command::Bind);
        assert_eq!(req.destination().host(), &Host::Ipv6(Ipv6Addr::from(ip)));
        assert_eq!(req.destination().port(), 1080);
    }

    #[tokio::test]
    async fn parse_udp_associate_dns() {
        let mut stream = io::Builder::new()
            .read(&[VERSION, CMD_UDP_ASSOCIATE, 0x00, ATYPE_DNS, 11])
            .read(b"example.com")
            .read(&[0x22, 0xB8])
            .build();

        let req = Request::decode_from(&mut stream).await.unwrap();

        assert_eq!(req.command(), Command::UdpAssociate);
        assert_eq!(req.destination().to_string(), "example.com:8888");
    }

    #[test]
    fn unknown_command() {
        assert!(matches!(
            decode::<Request>(&[VERSION, 0xC0, 0x00, ATYPE_IPV4, 0, 0, 0, 0, 0, 0]),
            Err(Error::MalformedFrame(Malformed::Command(0xC0)))
        ));
    }

    #[test]
    fn unknown_address_type() {
        assert!(matches!(
            decode::<Request>(&[VERSION, CMD_CONNECT, 0x00, 0xA8]),
            Err(Error::MalformedFrame(Malformed::AddressType(0xA8)))
        ));
    }

    #[test]
    fn nonzero_reserved_byte() {
        assert!(matches!(
            decode::<Request>(&[VERSION, CMD_CONNECT, 0x01, ATYPE_IPV4, 0, 0, 0, 0, 0, 0]),
            Err(Error::MalformedFrame(Malformed::Reserved(1)))
        ));
    }

    #[test]
    fn empty_domain_name() {
        assert!(matches!(
            decode::<Request>(&[VERSION, CMD_CONNECT, 0x00, ATYPE_DNS, 0, 0, 80]),
            Err(Error::MalformedFrame(Malformed::Empty(_)))
        ));
    }

    #[test]
    fn trailing_bytes_are_reported() {
        assert!(matches!(
            decode::<Request>(&[VERSION, CMD_CONNECT, 0x00, ATYPE_IPV4, 1, 2, 3, 4, 0, 80, 0xAA]),
            Err(Error::MalformedFrame(Malformed::TrailingBytes(1)))
        ));
    }

    #[test]
    fn malformed_frames_map_to_reply_codes() {
        assert_eq!(
            ReplyCode::from(&Malformed::Command(9)),
            ReplyCode::CommandNotSupported
        );
        assert_eq!(
            ReplyCode::from(&Malformed::AddressType(2)),
            ReplyCode::AddressTypeNotSupported
        );
        assert_eq!(
            ReplyCode::from(&Malformed::Truncated),
            ReplyCode::GeneralFailure
        );
    }
}

mod reply_encode {
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

    use super::super::*;
    use crate::socks::{decode, Error};

    #[test]
    fn success_reply() {
        let reply = Reply::success(SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 20), 1080).into());

        assert_eq!(
            reply.encode(),
            vec![VERSION, RESP_SUCCEEDED, 0x00, ATYPE_IPV4, 192, 0, 2, 20, 0x04, 0x38]
        );
        assert!(reply.is_success());
    }

    #[test]
    fn failure_reply_uses_unspecified_address() {
        let reply = Reply::failure(ReplyCode::HostUnreachable);

        assert_eq!(
            reply.encode(),
            vec![VERSION, RESP_HOST_UNREACHABLE, 0x00, ATYPE_IPV4, 0, 0, 0, 0, 0, 0]
        );
        assert!(!reply.is_success());
    }

    fn addresses() -> Vec<Address> {
        vec![
            Address::from(SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 20), 1080)),
            Address::unspecified(),
            "[2001:db8::1]:443".parse::<SocketAddr>().unwrap().into(),
            Address::domain("proxy.example", 8080).unwrap(),
            Address::domain("a".repeat(255), 65535).unwrap(),
        ]
    }

    #[test]
    fn every_request_decodes_back() {
        for command in [Command::Connect, Command::Bind, Command::UdpAssociate] {
            for destination in addresses() {
                let request = Request::new(command, destination);

                assert_eq!(decode::<Request>(&request.encode()).unwrap(), request);
            }
        }
    }

    #[test]
    fn every_reply_decodes_back() {
        let codes = [
            ReplyCode::Succeeded,
            ReplyCode::GeneralFailure,
            ReplyCode::ConnectionNotAllowed,
            ReplyCode::NetworkUnreachable,
            ReplyCode::HostUnreachable,
            ReplyCode::ConnectionRefused,
            ReplyCode::TtlExpired,
            ReplyCode::CommandNotSupported,
            ReplyCode::AddressTypeNotSupported,
        ];
        for code in codes {
            for bound in addresses() {
                let reply = Reply::new(code, bound);

                assert_eq!(decode::<Reply>(&reply.encode()).unwrap(), reply);
            }
        }
    }

    #[test]
    fn every_other_version_is_malformed() {
        let request = Request::connect(Address::unspecified()).encode();
        let reply = Reply::failure(ReplyCode::GeneralFailure).encode();

        for ver in (0..=255_u8).filter(|v| *v != VERSION) {
            let mut bad_request = request.clone();
            bad_request[0] = ver;
            let mut bad_reply = reply.clone();
            bad_reply[0] = ver;

            assert!(
                matches!(
                    decode::<Request>(&bad_request),
                    Err(Error::MalformedFrame(Malformed::Version(v))) if v == ver
                ),
                "request version {ver}"
            );
            assert!(
                matches!(
                    decode::<Reply>(&bad_reply),
                    Err(Error::MalformedFrame(Malformed::Version(v))) if v == ver
                ),
                "reply version {ver}"
            );
        }
    }

    #[test]
    fn unknown_reply_code() {
        assert!(matches!(
            decode::<Reply>(&[VERSION, 0x09, 0x00, ATYPE_IPV4, 0, 0, 0, 0, 0, 0]),
            Err(Error::MalformedFrame(Malformed::ReplyCode(9)))
        ));
    }
}

mod address_into_vec_u8 {
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV6};

    use super::super::*;

    fn encoded(address: &Address) -> Vec<u8> {
        let mut buf = Vec::new();
        address.encode_into(&mut buf);
        buf
    }

    #[test]
    fn ipv4_address() {
        let address = Address::from(Ipv4Addr::from([192, 0, 2, 20]));

        assert_eq!(encoded(&address), vec![ATYPE_IPV4, 192, 0, 2, 20, 0, 0]);
    }

    #[test]
    fn ipv6_address() {
        let ip = Ipv6Addr::from([32, 1, 13, 184, 0, 0, 0, 0, 0, 19, 21, 81, 1, 51, 0, 1]);
        let address = Address::from(std::net::SocketAddr::V6(SocketAddrV6::new(ip, 80, 0, 0)));

        assert_eq!(
            encoded(&address),
            vec![ATYPE_IPV6, 32, 1, 13, 184, 0, 0, 0, 0, 0, 19, 21, 81, 1, 51, 0, 1, 0, 80]
        );
    }

    #[test]
    fn dns_address() {
        let address = Address::domain("example.com", 80).unwrap();

        assert_eq!(
            encoded(&address),
            vec![ATYPE_DNS, 11, 101, 120, 97, 109, 112, 108, 101, 46, 99, 111, 109, 0, 80]
        );
    }
}
