mod p2p;
